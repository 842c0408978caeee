use crate::db::KVStore;
use crate::node::keccak;
use crate::{Trie, TrieError};
use primitive_types::H256;

const PREIMAGE_PREFIX: &[u8] = b"secure-key-";

fn preimage_key(hashed: &H256) -> Vec<u8> {
	let mut key = PREIMAGE_PREFIX.to_vec();
	key.extend_from_slice(hashed.as_bytes());
	key
}

/// Trie whose keys are keccak-hashed before insertion, so attacker-chosen
/// keys cannot craft deep unbalanced paths. Account and storage tries are
/// secure tries. Inserts also record the key preimage in the store, so the
/// original keys of a secure trie stay recoverable.
pub struct SecureTrie<D: KVStore> {
	inner: Trie<D>,
}

impl<D: KVStore> SecureTrie<D> {
	pub fn new(db: D) -> Self {
		SecureTrie {
			inner: Trie::new(db),
		}
	}

	pub fn open(db: D, root: H256) -> Self {
		SecureTrie {
			inner: Trie::open(db, root),
		}
	}

	pub fn db(&self) -> &D {
		self.inner.db()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn root_hash(&mut self) -> H256 {
		self.inner.root_hash()
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
		self.inner.get(keccak(key).as_bytes())
	}

	pub fn contains(&self, key: &[u8]) -> Result<bool, TrieError> {
		self.inner.contains(keccak(key).as_bytes())
	}

	pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
		let hashed = keccak(key);
		self.inner.db_mut().put(&preimage_key(&hashed), key);
		self.inner.insert(hashed.as_bytes(), value)
	}

	/// Original key of a hashed trie key, if its insert was seen by this
	/// store.
	pub fn preimage(&self, hashed: &H256) -> Option<Vec<u8>> {
		self.inner.db().get(&preimage_key(hashed))
	}

	pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
		self.inner.remove(keccak(key).as_bytes())
	}

	pub fn prove(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
		self.inner.prove(keccak(key).as_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::MemoryDB;
	use crate::node::EMPTY_ROOT;

	#[test]
	fn keys_are_hashed() {
		let mut secure = SecureTrie::new(MemoryDB::new());
		secure.insert(b"dog", b"puppy").unwrap();
		assert_eq!(secure.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
		assert_eq!(secure.preimage(&keccak(b"dog")), Some(b"dog".to_vec()));

		// The plain trie sees only the hashed key.
		let root = secure.root_hash();
		let plain = Trie::open(secure.db().clone(), root);
		assert_eq!(plain.get(b"dog").unwrap(), None);
		assert_eq!(
			plain.get(keccak(b"dog").as_bytes()).unwrap(),
			Some(b"puppy".to_vec())
		);
	}

	#[test]
	fn remove_restores_empty_root() {
		let mut secure = SecureTrie::new(MemoryDB::new());
		secure.insert(b"dog", b"puppy").unwrap();
		secure.remove(b"dog").unwrap();
		assert_eq!(secure.root_hash(), EMPTY_ROOT);
	}
}
