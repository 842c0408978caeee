//! Deterministic Ethereum-style execution core.
//!
//! The crate ties together the Merkle-Patricia state trie, the bytecode
//! interpreter and the consensus rules into a block-level state
//! transition: [`apply_transaction`] executes one signed transaction
//! against a [`State`], and [`block_state_transition`] applies a whole
//! block and checks every commitment in its header. Light-client proofs
//! for accounts and transactions live in [`spv`] and on
//! [`State::prove_account`].

#![forbid(unsafe_code)]

mod account;
mod block;
mod bloom;
mod executor;
mod params;
mod precompile;
mod spv;
mod state;
mod transaction;

pub use account::{Account, EMPTY_CODE_HASH};
pub use block::{
	block_state_transition, calc_difficulty, calc_gaslimit, check_gaslimit, ordered_root, Block,
	BlockError, Header, Receipt,
};
pub use bloom::Bloom;
pub use executor::{
	create_address, BlockContext, ChunkCache, Executor, Message, MessageResult, TxContext,
};
pub use params::ChainParams;
pub use spv::{mk_transaction_proof, verify_transaction_proof};
pub use state::{Log, Snapshot, State};
pub use transaction::{apply_transaction, Transaction, TransactionError, TransactionOutcome};

pub use ember_gasometer::Config;
pub use ember_trie::{
	keccak, verify_proof, KVStore, MemoryDB, OverlayDB, RefcountDB, SecureTrie, Trie, TrieError,
	EMPTY_ROOT,
};
