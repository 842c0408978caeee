//! World state: a secure trie of RLP-encoded accounts, each referencing a
//! storage trie and a code blob by hash, fronted by a write-back cache.
//!
//! Reads are infallible: a missing or undecodable trie node is a database
//! corruption, which is logged and surfaced as the default value so the
//! interpreter never has to thread storage errors through opcode
//! execution. `commit` and `root` do return errors, since they are called
//! at transaction boundaries where the caller can reject the block.

use crate::account::{Account, EMPTY_CODE_HASH};
use crate::bloom::Bloom;
use ember_trie::{keccak, KVStore, SecureTrie, TrieError, EMPTY_ROOT};
use primitive_types::{H160, H256, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// One log record emitted by `LOG0`..`LOG4`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Log {
	pub address: H160,
	pub topics: Vec<H256>,
	pub data: Vec<u8>,
}

impl Log {
	/// Bloom filter over the log's address and topics.
	pub fn bloom(&self) -> Bloom {
		let mut bloom = Bloom::new();
		bloom.add(self.address.as_bytes());
		for topic in &self.topics {
			bloom.add(topic.as_bytes());
		}
		bloom
	}
}

impl Encodable for Log {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(3);
		s.append(&self.address);
		s.append_list(&self.topics);
		s.append(&self.data);
	}
}

impl Decodable for Log {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		Ok(Log {
			address: rlp.val_at(0)?,
			topics: rlp.list_at(1)?,
			data: rlp.val_at(2)?,
		})
	}
}

#[derive(Clone, Debug)]
struct CacheEntry {
	account: Account,
	code: Option<Rc<Vec<u8>>>,
	storage: HashMap<H256, H256>,
	dirty_storage: HashSet<H256>,
	dirty: bool,
	dirty_code: bool,
	exists: bool,
	deleted: bool,
}

impl CacheEntry {
	fn blank() -> Self {
		CacheEntry {
			account: Account::default(),
			code: None,
			storage: HashMap::new(),
			dirty_storage: HashSet::new(),
			dirty: false,
			dirty_code: false,
			exists: false,
			deleted: false,
		}
	}
}

/// Saved copy of the mutable state, restored by [`State::revert`].
pub struct Snapshot {
	cache: HashMap<H160, CacheEntry>,
	logs: Vec<Log>,
	suicides: Vec<H160>,
	refunds: u64,
}

pub struct State<D: KVStore + Clone> {
	db: D,
	trie: SecureTrie<D>,
	cache: HashMap<H160, CacheEntry>,
	logs: Vec<Log>,
	suicides: Vec<H160>,
	refunds: u64,
}

impl<D: KVStore + Clone> State<D> {
	/// A state with an empty account trie.
	pub fn new(db: D) -> Self {
		let trie = SecureTrie::new(db.clone());
		State {
			db,
			trie,
			cache: HashMap::new(),
			logs: Vec::new(),
			suicides: Vec::new(),
			refunds: 0,
		}
	}

	/// Open the state at an existing root.
	pub fn open(db: D, root: H256) -> Self {
		let trie = SecureTrie::open(db.clone(), root);
		State {
			db,
			trie,
			cache: HashMap::new(),
			logs: Vec::new(),
			suicides: Vec::new(),
			refunds: 0,
		}
	}

	pub fn db(&self) -> &D {
		&self.db
	}

	fn entry(&mut self, address: H160) -> &mut CacheEntry {
		if !self.cache.contains_key(&address) {
			let entry = match self.trie.get(address.as_bytes()) {
				Ok(Some(raw)) => match rlp::decode::<Account>(&raw) {
					Ok(account) => CacheEntry {
						account,
						exists: true,
						..CacheEntry::blank()
					},
					Err(e) => {
						log::error!("undecodable account {:?} in state trie: {}", address, e);
						CacheEntry::blank()
					}
				},
				Ok(None) => CacheEntry::blank(),
				Err(e) => {
					log::error!("state trie read failed for {:?}: {}", address, e);
					CacheEntry::blank()
				}
			};
			self.cache.insert(address, entry);
		}
		self.cache
			.get_mut(&address)
			.expect("entry inserted above; qed")
	}

	pub fn exists(&mut self, address: H160) -> bool {
		self.entry(address).exists
	}

	pub fn balance(&mut self, address: H160) -> U256 {
		self.entry(address).account.balance
	}

	pub fn nonce(&mut self, address: H160) -> U256 {
		self.entry(address).account.nonce
	}

	pub fn set_balance(&mut self, address: H160, balance: U256) {
		let entry = self.entry(address);
		entry.account.balance = balance;
		entry.dirty = true;
		entry.exists = true;
	}

	pub fn add_balance(&mut self, address: H160, value: U256) {
		let balance = self.balance(address).saturating_add(value);
		self.set_balance(address, balance);
	}

	pub fn sub_balance(&mut self, address: H160, value: U256) {
		let balance = self.balance(address).saturating_sub(value);
		self.set_balance(address, balance);
	}

	/// Move `value` between accounts. Returns false and leaves both
	/// untouched when the source balance is insufficient.
	pub fn transfer_value(&mut self, from: H160, to: H160, value: U256) -> bool {
		if self.balance(from) < value {
			return false;
		}
		self.sub_balance(from, value);
		self.add_balance(to, value);
		true
	}

	pub fn set_nonce(&mut self, address: H160, nonce: U256) {
		let entry = self.entry(address);
		entry.account.nonce = nonce;
		entry.dirty = true;
		entry.exists = true;
	}

	pub fn inc_nonce(&mut self, address: H160) {
		let nonce = self.nonce(address) + U256::one();
		self.set_nonce(address, nonce);
	}

	pub fn code(&mut self, address: H160) -> Rc<Vec<u8>> {
		if let Some(code) = &self.entry(address).code {
			return code.clone();
		}
		let code_hash = self.entry(address).account.code_hash;
		let code = if code_hash == EMPTY_CODE_HASH {
			Rc::new(Vec::new())
		} else {
			match self.db.get(code_hash.as_bytes()) {
				Some(raw) => Rc::new(raw),
				None => {
					log::error!("code blob {:?} missing from the database", code_hash);
					Rc::new(Vec::new())
				}
			}
		};
		self.entry(address).code = Some(code.clone());
		code
	}

	pub fn set_code(&mut self, address: H160, code: Vec<u8>) {
		let entry = self.entry(address);
		entry.code = Some(Rc::new(code));
		entry.dirty = true;
		entry.dirty_code = true;
		entry.exists = true;
	}

	pub fn storage(&mut self, address: H160, key: H256) -> H256 {
		if let Some(value) = self.entry(address).storage.get(&key) {
			return *value;
		}
		let storage_root = self.entry(address).account.storage_root;
		let value = if storage_root == EMPTY_ROOT {
			H256::zero()
		} else {
			let storage = SecureTrie::open(self.db.clone(), storage_root);
			match storage.get(key.as_bytes()) {
				Ok(Some(raw)) => match Rlp::new(&raw).as_val::<U256>() {
					Ok(value) => {
						let mut buf = [0u8; 32];
						value.to_big_endian(&mut buf);
						H256(buf)
					}
					Err(e) => {
						log::error!("undecodable storage value at {:?}: {}", key, e);
						H256::zero()
					}
				},
				Ok(None) => H256::zero(),
				Err(e) => {
					log::error!("storage trie read failed for {:?}: {}", address, e);
					H256::zero()
				}
			}
		};
		self.entry(address).storage.insert(key, value);
		value
	}

	pub fn set_storage(&mut self, address: H160, key: H256, value: H256) {
		let entry = self.entry(address);
		entry.storage.insert(key, value);
		entry.dirty_storage.insert(key);
		entry.dirty = true;
		entry.exists = true;
	}

	/// Drop every storage slot of the account. Used when a contract is
	/// created over a pre-existing address.
	pub fn reset_storage(&mut self, address: H160) {
		let entry = self.entry(address);
		entry.storage.clear();
		entry.dirty_storage.clear();
		entry.account.storage_root = EMPTY_ROOT;
		entry.dirty = true;
	}

	pub fn add_log(&mut self, log: Log) {
		self.logs.push(log);
	}

	pub fn logs(&self) -> &[Log] {
		&self.logs
	}

	pub fn take_logs(&mut self) -> Vec<Log> {
		std::mem::take(&mut self.logs)
	}

	pub fn add_refund(&mut self, refund: u64) {
		self.refunds += refund;
	}

	pub fn refunds(&self) -> u64 {
		self.refunds
	}

	pub fn add_suicide(&mut self, address: H160) {
		self.suicides.push(address);
	}

	pub fn suicides(&self) -> &[H160] {
		&self.suicides
	}

	/// Remove the account entirely at the next commit.
	pub fn del_account(&mut self, address: H160) {
		let entry = self.entry(address);
		*entry = CacheEntry::blank();
		entry.deleted = true;
		entry.dirty = true;
	}

	/// Clear the per-transaction substate: logs, refunds, pending
	/// suicides.
	pub fn reset_transaction_state(&mut self) {
		self.logs.clear();
		self.suicides.clear();
		self.refunds = 0;
	}

	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			cache: self.cache.clone(),
			logs: self.logs.clone(),
			suicides: self.suicides.clone(),
			refunds: self.refunds,
		}
	}

	pub fn revert(&mut self, snapshot: Snapshot) {
		self.cache = snapshot.cache;
		self.logs = snapshot.logs;
		self.suicides = snapshot.suicides;
		self.refunds = snapshot.refunds;
	}

	/// Flush all dirty cache entries into the tries and return the new
	/// state root. Addresses are flushed in sorted order so node refcount
	/// traffic is deterministic.
	pub fn commit(&mut self) -> Result<H256, TrieError> {
		let mut addresses: Vec<H160> = self
			.cache
			.iter()
			.filter(|(_, entry)| entry.dirty || entry.deleted)
			.map(|(address, _)| *address)
			.collect();
		addresses.sort();

		for address in addresses {
			let entry = self
				.cache
				.get_mut(&address)
				.expect("address collected from the cache above; qed");

			if entry.deleted {
				self.trie.remove(address.as_bytes())?;
				*entry = CacheEntry::blank();
				continue;
			}

			if !entry.dirty_storage.is_empty() {
				let mut storage = SecureTrie::open(self.db.clone(), entry.account.storage_root);
				let mut keys: Vec<H256> = entry.dirty_storage.drain().collect();
				keys.sort();
				for key in keys {
					let value = entry.storage.get(&key).copied().unwrap_or_default();
					if value.is_zero() {
						storage.remove(key.as_bytes())?;
					} else {
						let mut stream = RlpStream::new();
						stream.append(&U256::from_big_endian(value.as_bytes()));
						storage.insert(key.as_bytes(), &stream.out())?;
					}
				}
				entry.account.storage_root = storage.root_hash();
			}

			if entry.dirty_code {
				let code = entry
					.code
					.as_ref()
					.expect("dirty_code is only set together with code; qed");
				entry.account.code_hash = if code.is_empty() {
					EMPTY_CODE_HASH
				} else {
					let hash = keccak(code);
					self.db.put(hash.as_bytes(), code);
					hash
				};
				entry.dirty_code = false;
			}

			self.trie
				.insert(address.as_bytes(), &rlp::encode(&entry.account))?;
			entry.dirty = false;
			entry.exists = true;
		}

		Ok(self.trie.root_hash())
	}

	/// Current state root. Flushes pending writes first.
	pub fn root(&mut self) -> Result<H256, TrieError> {
		self.commit()
	}

	/// Merkle proof of an account record against the current root.
	pub fn prove_account(&mut self, address: H160) -> Result<Vec<Vec<u8>>, TrieError> {
		self.commit()?;
		self.trie.prove(address.as_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ember_trie::MemoryDB;

	fn addr(n: u8) -> H160 {
		H160::repeat_byte(n)
	}

	#[test]
	fn fresh_accounts_are_blank() {
		let mut state = State::new(MemoryDB::new());
		assert!(!state.exists(addr(1)));
		assert_eq!(state.balance(addr(1)), U256::zero());
		assert_eq!(state.nonce(addr(1)), U256::zero());
		assert_eq!(state.storage(addr(1), H256::zero()), H256::zero());
		assert!(state.code(addr(1)).is_empty());
	}

	#[test]
	fn balances_survive_commit_and_reopen() {
		let db = MemoryDB::new();
		let mut state = State::new(db.clone());
		state.set_balance(addr(1), U256::from(1000));
		state.inc_nonce(addr(1));
		let root = state.commit().unwrap();

		let mut reopened = State::open(db, root);
		assert_eq!(reopened.balance(addr(1)), U256::from(1000));
		assert_eq!(reopened.nonce(addr(1)), U256::one());
		assert!(reopened.exists(addr(1)));
	}

	#[test]
	fn storage_roundtrips_through_commit() {
		let db = MemoryDB::new();
		let mut state = State::new(db.clone());
		let key = H256::from_low_u64_be(3);
		let value = H256::from_low_u64_be(0x1234);
		// A value with a set high byte catches byte-order slips in the
		// trie encoding.
		let mut wide = [0u8; 32];
		wide[0] = 0xde;
		wide[31] = 0xad;
		let wide = H256(wide);
		state.set_storage(addr(1), key, value);
		state.set_storage(addr(1), H256::from_low_u64_be(9), wide);
		let root = state.commit().unwrap();

		let mut reopened = State::open(db, root);
		assert_eq!(reopened.storage(addr(1), key), value);
		assert_eq!(reopened.storage(addr(1), H256::from_low_u64_be(9)), wide);
		assert_eq!(
			reopened.storage(addr(1), H256::from_low_u64_be(4)),
			H256::zero()
		);
	}

	#[test]
	fn zero_storage_write_clears_the_slot() {
		let db = MemoryDB::new();
		let mut state = State::new(db.clone());
		let key = H256::from_low_u64_be(3);
		state.set_storage(addr(1), key, H256::from_low_u64_be(1));
		let root_with = state.commit().unwrap();
		state.set_storage(addr(1), key, H256::zero());
		state.commit().unwrap();

		// The storage trie is empty again.
		let mut reopened = State::open(db, state.root().unwrap());
		assert_eq!(reopened.storage(addr(1), key), H256::zero());
		assert_ne!(root_with, reopened.root().unwrap());
	}

	#[test]
	fn code_is_stored_by_hash() {
		let db = MemoryDB::new();
		let mut state = State::new(db.clone());
		let code = vec![0x60, 0x00, 0x60, 0x00, 0xf3];
		state.set_code(addr(1), code.clone());
		let root = state.commit().unwrap();

		let mut reopened = State::open(db.clone(), root);
		assert_eq!(*reopened.code(addr(1)), code);
		assert_eq!(db.get(keccak(&code).as_bytes()), Some(code));
	}

	#[test]
	fn snapshot_revert_undoes_everything() {
		let mut state = State::new(MemoryDB::new());
		state.set_balance(addr(1), U256::from(100));
		let snapshot = state.snapshot();

		state.set_balance(addr(1), U256::from(5));
		state.set_storage(addr(1), H256::zero(), H256::from_low_u64_be(9));
		state.add_log(Log {
			address: addr(1),
			topics: vec![],
			data: vec![1],
		});
		state.add_refund(15000);
		state.add_suicide(addr(2));

		state.revert(snapshot);
		assert_eq!(state.balance(addr(1)), U256::from(100));
		assert_eq!(state.storage(addr(1), H256::zero()), H256::zero());
		assert!(state.logs().is_empty());
		assert_eq!(state.refunds(), 0);
		assert!(state.suicides().is_empty());
	}

	#[test]
	fn transfer_checks_balance() {
		let mut state = State::new(MemoryDB::new());
		state.set_balance(addr(1), U256::from(10));
		assert!(!state.transfer_value(addr(1), addr(2), U256::from(11)));
		assert_eq!(state.balance(addr(1)), U256::from(10));
		assert!(state.transfer_value(addr(1), addr(2), U256::from(4)));
		assert_eq!(state.balance(addr(1)), U256::from(6));
		assert_eq!(state.balance(addr(2)), U256::from(4));
	}

	#[test]
	fn deleted_account_is_gone_after_commit() {
		let db = MemoryDB::new();
		let mut state = State::new(db.clone());
		state.set_balance(addr(1), U256::from(10));
		state.set_balance(addr(2), U256::from(20));
		state.commit().unwrap();

		state.del_account(addr(1));
		let root = state.commit().unwrap();

		let mut reopened = State::open(db, root);
		assert!(!reopened.exists(addr(1)));
		assert_eq!(reopened.balance(addr(1)), U256::zero());
		assert_eq!(reopened.balance(addr(2)), U256::from(20));
	}

	#[test]
	fn account_proof_verifies() {
		let mut state = State::new(MemoryDB::new());
		state.set_balance(addr(1), U256::from(77));
		state.set_balance(addr(2), U256::from(88));
		let root = state.commit().unwrap();

		let proof = state.prove_account(addr(1)).unwrap();
		let raw = ember_trie::verify_proof(root, keccak(addr(1).as_bytes()).as_bytes(), &proof)
			.unwrap()
			.unwrap();
		let account = rlp::decode::<Account>(&raw).unwrap();
		assert_eq!(account.balance, U256::from(77));
	}
}
