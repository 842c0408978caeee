//! Merkle-Patricia trie with reference-counted pruning.

#![forbid(unsafe_code)]

mod db;
mod error;
mod nibbles;
mod node;
mod proof;
mod secure;
mod trie;

pub use crate::db::{
	KVStore, MemoryDB, OverlayDB, RefcountDB, DEATH_ROW_OFFSET, DEFAULT_PRUNING_TTL,
};
pub use crate::error::TrieError;
pub use crate::nibbles::{bytes_to_nibbles, hex_prefix_decode, hex_prefix_encode};
pub use crate::node::{keccak, EMPTY_ROOT};
pub use crate::proof::verify_proof;
pub use crate::secure::SecureTrie;
pub use crate::trie::Trie;
