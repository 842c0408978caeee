//! Key-value stores backing the trie.
//!
//! Handles are cheap to clone and share their underlying storage, so a
//! state layer and the tries it opens can all write through one store.
//! Mutation is confined to a single thread.

use rlp::{Rlp, RlpStream};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// The refcount space above this offset marks nodes sitting on death row,
/// tagged with the epoch at which they may be physically deleted.
pub const DEATH_ROW_OFFSET: u64 = 1 << 62;

/// Default number of epochs a death-row node survives before cleanup may
/// delete it.
pub const DEFAULT_PRUNING_TTL: u64 = 5000;

/// Backing store abstraction for trie nodes.
///
/// `put` stores a node under its hash; `unref` signals that one reference
/// to the node went away. Plain stores ignore `unref` -- a node may be
/// shared by tries the store cannot see, so physical deletion is only
/// safe for stores that track references.
pub trait KVStore {
	fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
	fn put(&mut self, key: &[u8], value: &[u8]);

	fn contains(&self, key: &[u8]) -> bool {
		self.get(key).is_some()
	}

	fn unref(&mut self, key: &[u8]) {
		let _ = key;
	}

	/// Physically remove a key. Plain stores may ignore this as well.
	fn remove(&mut self, key: &[u8]) {
		let _ = key;
	}
}

/// In-memory store.
#[derive(Clone, Debug, Default)]
pub struct MemoryDB {
	inner: Rc<RefCell<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryDB {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.inner.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.borrow().is_empty()
	}
}

impl KVStore for MemoryDB {
	fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.inner.borrow().get(key).cloned()
	}

	fn put(&mut self, key: &[u8], value: &[u8]) {
		self.inner
			.borrow_mut()
			.insert(key.to_vec(), value.to_vec());
	}

	fn contains(&self, key: &[u8]) -> bool {
		self.inner.borrow().contains_key(key)
	}

	fn remove(&mut self, key: &[u8]) {
		self.inner.borrow_mut().remove(key);
	}
}

/// Write-masking overlay over another store. Writes and unrefs stay in the
/// overlay until `commit` pushes them down or `clear` drops them.
#[derive(Clone, Debug)]
pub struct OverlayDB<D> {
	backing: D,
	overlay: Rc<RefCell<HashMap<Vec<u8>, Option<Vec<u8>>>>>,
}

impl<D: KVStore> OverlayDB<D> {
	pub fn new(backing: D) -> Self {
		Self {
			backing,
			overlay: Rc::new(RefCell::new(HashMap::new())),
		}
	}

	/// Push all overlay changes into the backing store.
	pub fn commit(&mut self) {
		let drained: Vec<_> = self.overlay.borrow_mut().drain().collect();
		for (key, value) in drained {
			match value {
				Some(value) => self.backing.put(&key, &value),
				None => self.backing.unref(&key),
			}
		}
	}

	/// Drop all overlay changes.
	pub fn clear(&mut self) {
		self.overlay.borrow_mut().clear();
	}

	pub fn backing(&self) -> &D {
		&self.backing
	}
}

impl<D: KVStore> KVStore for OverlayDB<D> {
	fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
		match self.overlay.borrow().get(key) {
			Some(Some(value)) => Some(value.clone()),
			Some(None) => None,
			None => self.backing.get(key),
		}
	}

	fn put(&mut self, key: &[u8], value: &[u8]) {
		self.overlay
			.borrow_mut()
			.insert(key.to_vec(), Some(value.to_vec()));
	}

	fn unref(&mut self, key: &[u8]) {
		self.overlay.borrow_mut().insert(key.to_vec(), None);
	}
}

#[derive(Debug)]
struct RefcountInner<D> {
	db: D,
	ttl: u64,
	/// `(old_refcount, key)` pairs for the epoch being built.
	journal: Vec<(u64, Vec<u8>)>,
	/// Sealed journals, keyed by the epoch they were committed under.
	journals: BTreeMap<u64, Vec<(u64, Vec<u8>)>>,
	/// Keys that dropped to refcount zero in the epoch being built.
	death_row: Vec<Vec<u8>>,
	/// Sealed death rows, keyed by the epoch cleanup may process them.
	death_rows: BTreeMap<u64, Vec<Vec<u8>>>,
}

/// Reference-counting store. Every value is wrapped as
/// `rlp([refcount, value])`; `put` increments, `unref` decrements, and
/// nodes that drop to zero sit on death row for `ttl` epochs before
/// `cleanup` may physically delete them. Journals allow reverting all
/// refcount changes of an epoch, e.g. when a chain reorg throws a block
/// away.
#[derive(Clone, Debug)]
pub struct RefcountDB<D> {
	inner: Rc<RefCell<RefcountInner<D>>>,
}

fn encode_entry(refcount: u64, value: &[u8]) -> Vec<u8> {
	let mut stream = RlpStream::new_list(2);
	stream.append(&refcount);
	stream.append(&value);
	stream.out().to_vec()
}

fn decode_entry(raw: &[u8]) -> Option<(u64, Vec<u8>)> {
	let rlp = Rlp::new(raw);
	let refcount = rlp.val_at::<u64>(0).ok()?;
	let value = rlp.val_at::<Vec<u8>>(1).ok()?;
	Some((refcount, value))
}

impl<D: KVStore> RefcountDB<D> {
	pub fn new(db: D) -> Self {
		Self {
			inner: Rc::new(RefCell::new(RefcountInner {
				db,
				ttl: DEFAULT_PRUNING_TTL,
				journal: Vec::new(),
				journals: BTreeMap::new(),
				death_row: Vec::new(),
				death_rows: BTreeMap::new(),
			})),
		}
	}

	pub fn with_ttl(db: D, ttl: u64) -> Self {
		let this = Self::new(db);
		this.inner.borrow_mut().ttl = ttl;
		this
	}

	/// Current reference count of a key. Death-row entries report zero.
	pub fn refcount(&self, key: &[u8]) -> u64 {
		let inner = self.inner.borrow();
		match inner.db.get(key).and_then(|raw| decode_entry(&raw)) {
			Some((refcount, _)) if refcount < DEATH_ROW_OFFSET => refcount,
			_ => 0,
		}
	}

	/// Seal the journal and death-row additions of the epoch. Nodes that
	/// dropped to zero are tagged for deletion at `epoch + ttl`.
	pub fn commit_refcount_changes(&mut self, epoch: u64) {
		let mut inner = self.inner.borrow_mut();
		let inner = &mut *inner;
		let timeout_epoch = epoch + inner.ttl;

		let death_row = std::mem::take(&mut inner.death_row);
		for key in &death_row {
			if let Some((refcount, value)) = inner.db.get(key).and_then(|raw| decode_entry(&raw))
			{
				if refcount == 0 {
					inner
						.db
						.put(key, &encode_entry(DEATH_ROW_OFFSET + timeout_epoch, &value));
				}
			}
		}
		inner
			.death_rows
			.entry(timeout_epoch)
			.or_default()
			.extend(death_row);

		let journal = std::mem::take(&mut inner.journal);
		inner.journals.entry(epoch).or_default().extend(journal);
	}

	/// Undo all refcount changes committed under `epoch`, and drop the
	/// death-row additions it produced.
	pub fn revert_refcount_changes(&mut self, epoch: u64) {
		let mut inner = self.inner.borrow_mut();
		let inner = &mut *inner;
		let timeout_epoch = epoch + inner.ttl;

		inner.death_rows.remove(&timeout_epoch);
		if let Some(journal) = inner.journals.remove(&epoch) {
			for (old_refcount, key) in journal.into_iter().rev() {
				if let Some((_, value)) = inner.db.get(&key).and_then(|raw| decode_entry(&raw)) {
					inner.db.put(&key, &encode_entry(old_refcount, &value));
				}
			}
		}
	}

	/// Physically delete nodes whose death-row tag matches `epoch`, and
	/// drop journals too old to revert.
	pub fn cleanup(&mut self, epoch: u64) {
		let mut inner = self.inner.borrow_mut();
		let inner = &mut *inner;

		let mut pruned = 0usize;
		if let Some(keys) = inner.death_rows.remove(&epoch) {
			for key in keys {
				if let Some((refcount, _)) = inner.db.get(&key).and_then(|raw| decode_entry(&raw))
				{
					// A node re-referenced and re-killed since it was
					// marked carries a newer tag and must survive.
					if refcount == DEATH_ROW_OFFSET + epoch {
						inner.db.remove(&key);
						pruned += 1;
					}
				}
			}
		}
		if pruned > 0 {
			log::debug!("pruned {} trie nodes at epoch {}", pruned, epoch);
		}

		if let Some(old) = epoch.checked_sub(inner.ttl) {
			inner.journals.remove(&old);
		}
	}
}

impl<D: KVStore> KVStore for RefcountDB<D> {
	fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
		let inner = self.inner.borrow();
		inner
			.db
			.get(key)
			.and_then(|raw| decode_entry(&raw))
			.map(|(_, value)| value)
	}

	fn put(&mut self, key: &[u8], value: &[u8]) {
		let mut inner = self.inner.borrow_mut();
		match inner.db.get(key).and_then(|raw| decode_entry(&raw)) {
			Some((mut refcount, stored)) => {
				inner.journal.push((refcount, key.to_vec()));
				// Re-referencing a death-row node resurrects it.
				if refcount >= DEATH_ROW_OFFSET {
					refcount = 0;
				}
				inner.db.put(key, &encode_entry(refcount + 1, &stored));
			}
			None => {
				inner.journal.push((0, key.to_vec()));
				inner.db.put(key, &encode_entry(1, value));
			}
		}
	}

	fn unref(&mut self, key: &[u8]) {
		let mut inner = self.inner.borrow_mut();
		match inner.db.get(key).and_then(|raw| decode_entry(&raw)) {
			Some((refcount, stored)) => {
				// Decrementing past zero (or a node already on death row)
				// is tolerated silently; shared structure between tries
				// makes the count an upper bound, never exact.
				if refcount == 0 || refcount >= DEATH_ROW_OFFSET {
					return;
				}
				inner.journal.push((refcount, key.to_vec()));
				inner.db.put(key, &encode_entry(refcount - 1, &stored));
				if refcount == 1 {
					inner.death_row.push(key.to_vec());
				}
			}
			None => (),
		}
	}
}
