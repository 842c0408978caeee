//! Verification of Merkle proofs produced by [`Trie::prove`].
//!
//! A proof is the set of node encodings on the lookup path. Verification
//! rebuilds a tiny node store from the proof and replays the lookup
//! against the claimed root, so a tampered or truncated proof either
//! fails to decode or dead-ends on a missing node.

use crate::db::{KVStore, MemoryDB};
use crate::node::keccak;
use crate::{Trie, TrieError};
use primitive_types::H256;

/// Check a proof against `root`. Returns the proven value, or `None` when
/// the proof shows the key is absent.
pub fn verify_proof(
	root: H256,
	key: &[u8],
	proof: &[Vec<u8>],
) -> Result<Option<Vec<u8>>, TrieError> {
	let mut db = MemoryDB::new();
	for node in proof {
		db.put(keccak(node).as_bytes(), node);
	}
	let trie = Trie::open(db, root);
	match trie.get(key) {
		Ok(value) => Ok(value),
		Err(TrieError::MissingNode(_)) => Err(TrieError::InvalidProof),
		Err(other) => Err(other),
	}
}
