//! Merkle-Patricia trie over a [`KVStore`].
//!
//! Nodes are stored under the keccak of their RLP encoding; nodes whose
//! encoding is shorter than 32 bytes are inlined into their parent
//! instead. Every structural change unrefs the nodes it replaces and puts
//! the nodes it creates, so a reference-counting store can prune stale
//! state.

use crate::db::KVStore;
use crate::nibbles::{bytes_to_nibbles, nibbles_to_bytes};
use crate::node::{
	decode_node_bytes, empty_children, encode_node, keccak, Node, NodeRef, EMPTY_ROOT,
};
use crate::TrieError;
use primitive_types::H256;
use std::collections::BTreeMap;
use std::mem;

/// Payload of a two-item node: a leaf carries a value, an extension a
/// child reference.
enum Payload {
	Value(Vec<u8>),
	Child(NodeRef),
}

pub struct Trie<D: KVStore> {
	db: D,
	root: NodeRef,
}

impl<D: KVStore> Trie<D> {
	/// An empty trie over `db`.
	pub fn new(db: D) -> Self {
		Trie {
			db,
			root: NodeRef::Empty,
		}
	}

	/// Open an existing trie at `root`.
	pub fn open(db: D, root: H256) -> Self {
		let root = if root == EMPTY_ROOT {
			NodeRef::Empty
		} else {
			NodeRef::Hash(root)
		};
		Trie { db, root }
	}

	pub fn db(&self) -> &D {
		&self.db
	}

	pub fn db_mut(&mut self) -> &mut D {
		&mut self.db
	}

	pub fn is_empty(&self) -> bool {
		matches!(self.root, NodeRef::Empty)
	}

	/// Root hash of the current contents. Stores the root node in the
	/// database by hash even when its encoding is short.
	pub fn root_hash(&mut self) -> H256 {
		match &self.root {
			NodeRef::Empty => EMPTY_ROOT,
			NodeRef::Hash(hash) => *hash,
			NodeRef::Inline(node) => {
				let encoded = encode_node(node);
				let hash = keccak(&encoded);
				self.db.put(hash.as_bytes(), &encoded);
				self.root = NodeRef::Hash(hash);
				hash
			}
		}
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
		self.lookup(&self.root, &bytes_to_nibbles(key), None)
	}

	pub fn contains(&self, key: &[u8]) -> Result<bool, TrieError> {
		Ok(self.get(key)?.is_some())
	}

	/// Insert a key-value pair. An empty value removes the key; the node
	/// encoding cannot distinguish an empty value from an absent one.
	pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
		if value.is_empty() {
			return self.remove(key);
		}
		let root = mem::replace(&mut self.root, NodeRef::Empty);
		self.root = self.update_at(root, &bytes_to_nibbles(key), value.to_vec())?;
		Ok(())
	}

	/// Remove a key. Removing an absent key is a no-op.
	pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
		let root = mem::replace(&mut self.root, NodeRef::Empty);
		self.root = self.delete_at(root, &bytes_to_nibbles(key))?;
		Ok(())
	}

	/// Collect proof nodes for `key`: the RLP encodings of every stored
	/// node on the lookup path, root first.
	pub fn prove(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
		// Make sure the root sits in the database so the walk records it.
		self.root_hash();
		let mut proof = Vec::new();
		self.lookup(&self.root.clone(), &bytes_to_nibbles(key), Some(&mut proof))?;
		Ok(proof)
	}

	/// Walk the whole trie into a key-value map.
	pub fn to_map(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, TrieError> {
		let mut out = BTreeMap::new();
		let mut prefix = Vec::new();
		self.collect(&self.root, &mut prefix, &mut out)?;
		Ok(out)
	}

	fn resolve(
		&self,
		node_ref: &NodeRef,
		mut proof: Option<&mut Vec<Vec<u8>>>,
	) -> Result<Node, TrieError> {
		match node_ref {
			NodeRef::Empty => Ok(Node::Blank),
			NodeRef::Inline(node) => Ok((**node).clone()),
			NodeRef::Hash(hash) => {
				let raw = self
					.db
					.get(hash.as_bytes())
					.ok_or(TrieError::MissingNode(*hash))?;
				if let Some(proof) = proof.as_deref_mut() {
					if !proof.iter().any(|recorded| *recorded == raw) {
						proof.push(raw.clone());
					}
				}
				decode_node_bytes(&raw)
			}
		}
	}

	fn lookup(
		&self,
		node_ref: &NodeRef,
		path: &[u8],
		mut proof: Option<&mut Vec<Vec<u8>>>,
	) -> Result<Option<Vec<u8>>, TrieError> {
		match self.resolve(node_ref, proof.as_deref_mut())? {
			Node::Blank => Ok(None),
			Node::Leaf {
				path: node_path,
				value,
			} => {
				if node_path[..] == *path {
					Ok(Some(value))
				} else {
					Ok(None)
				}
			}
			Node::Extension {
				path: node_path,
				child,
			} => {
				if path.len() >= node_path.len() && path[..node_path.len()] == node_path[..] {
					self.lookup(&child, &path[node_path.len()..], proof)
				} else {
					Ok(None)
				}
			}
			Node::Branch { children, value } => {
				if path.is_empty() {
					Ok(value)
				} else {
					self.lookup(&children[path[0] as usize], &path[1..], proof)
				}
			}
		}
	}

	fn collect(
		&self,
		node_ref: &NodeRef,
		prefix: &mut Vec<u8>,
		out: &mut BTreeMap<Vec<u8>, Vec<u8>>,
	) -> Result<(), TrieError> {
		match self.resolve(node_ref, None)? {
			Node::Blank => (),
			Node::Leaf { path, value } => {
				let depth = prefix.len();
				prefix.extend_from_slice(&path);
				out.insert(nibbles_to_bytes(prefix), value);
				prefix.truncate(depth);
			}
			Node::Extension { path, child } => {
				let depth = prefix.len();
				prefix.extend_from_slice(&path);
				self.collect(&child, prefix, out)?;
				prefix.truncate(depth);
			}
			Node::Branch { children, value } => {
				if let Some(value) = value {
					out.insert(nibbles_to_bytes(prefix), value);
				}
				for (index, child) in children.iter().enumerate() {
					prefix.push(index as u8);
					self.collect(child, prefix, out)?;
					prefix.pop();
				}
			}
		}
		Ok(())
	}

	/// Take ownership of a referenced node, releasing its database
	/// reference when it was stored by hash.
	fn take_node(&mut self, node_ref: NodeRef) -> Result<Node, TrieError> {
		match node_ref {
			NodeRef::Empty => Ok(Node::Blank),
			NodeRef::Inline(node) => Ok(*node),
			NodeRef::Hash(hash) => {
				let raw = self
					.db
					.get(hash.as_bytes())
					.ok_or(TrieError::MissingNode(hash))?;
				self.db.unref(hash.as_bytes());
				decode_node_bytes(&raw)
			}
		}
	}

	/// Store a node, inlining it when its encoding is short.
	fn write_node(&mut self, node: Node) -> NodeRef {
		if let Node::Blank = node {
			return NodeRef::Empty;
		}
		let encoded = encode_node(&node);
		if encoded.len() < 32 {
			NodeRef::Inline(Box::new(node))
		} else {
			let hash = keccak(&encoded);
			self.db.put(hash.as_bytes(), &encoded);
			NodeRef::Hash(hash)
		}
	}

	fn update_at(
		&mut self,
		node_ref: NodeRef,
		path: &[u8],
		value: Vec<u8>,
	) -> Result<NodeRef, TrieError> {
		match self.take_node(node_ref)? {
			Node::Blank => Ok(self.write_node(Node::Leaf {
				path: path.to_vec(),
				value,
			})),
			Node::Branch {
				mut children,
				value: branch_value,
			} => {
				if path.is_empty() {
					return Ok(self.write_node(Node::Branch {
						children,
						value: Some(value),
					}));
				}
				let index = path[0] as usize;
				let child = mem::replace(&mut children[index], NodeRef::Empty);
				children[index] = self.update_at(child, &path[1..], value)?;
				Ok(self.write_node(Node::Branch {
					children,
					value: branch_value,
				}))
			}
			Node::Leaf {
				path: node_path,
				value: node_value,
			} => self.update_kv(node_path, Payload::Value(node_value), path, value),
			Node::Extension {
				path: node_path,
				child,
			} => self.update_kv(node_path, Payload::Child(child), path, value),
		}
	}

	/// Insert into a leaf or extension node, splitting on the longest
	/// common path prefix.
	fn update_kv(
		&mut self,
		node_path: Vec<u8>,
		payload: Payload,
		path: &[u8],
		value: Vec<u8>,
	) -> Result<NodeRef, TrieError> {
		let prefix_len = node_path
			.iter()
			.zip(path.iter())
			.take_while(|(a, b)| a == b)
			.count();
		let remain_node = &node_path[prefix_len..];
		let remain_path = &path[prefix_len..];

		let new_ref = if remain_path.is_empty() && remain_node.is_empty() {
			match payload {
				// Exact hit on a leaf: replace the value in place.
				Payload::Value(_) => {
					return Ok(self.write_node(Node::Leaf {
						path: node_path,
						value,
					}));
				}
				Payload::Child(child) => self.update_at(child, &[], value)?,
			}
		} else if remain_node.is_empty() {
			match payload {
				// The new key continues below this extension.
				Payload::Child(child) => self.update_at(child, remain_path, value)?,
				// The leaf's key is a proper prefix of the new key: the
				// old value moves into the branch slot.
				Payload::Value(node_value) => {
					let mut children = empty_children();
					children[remain_path[0] as usize] = self.write_node(Node::Leaf {
						path: remain_path[1..].to_vec(),
						value,
					});
					self.write_node(Node::Branch {
						children,
						value: Some(node_value),
					})
				}
			}
		} else {
			// Paths diverge: fan out into a branch.
			let mut children = empty_children();
			children[remain_node[0] as usize] = match payload {
				Payload::Child(child) if remain_node.len() == 1 => child,
				Payload::Child(child) => self.write_node(Node::Extension {
					path: remain_node[1..].to_vec(),
					child,
				}),
				Payload::Value(node_value) => self.write_node(Node::Leaf {
					path: remain_node[1..].to_vec(),
					value: node_value,
				}),
			};
			let mut branch_value = None;
			if remain_path.is_empty() {
				branch_value = Some(value);
			} else {
				children[remain_path[0] as usize] = self.write_node(Node::Leaf {
					path: remain_path[1..].to_vec(),
					value,
				});
			}
			self.write_node(Node::Branch {
				children,
				value: branch_value,
			})
		};

		if prefix_len > 0 {
			Ok(self.write_node(Node::Extension {
				path: path[..prefix_len].to_vec(),
				child: new_ref,
			}))
		} else {
			Ok(new_ref)
		}
	}

	fn delete_at(&mut self, node_ref: NodeRef, path: &[u8]) -> Result<NodeRef, TrieError> {
		let new_node = match self.take_node(node_ref)? {
			Node::Blank => Node::Blank,
			Node::Branch { children, value } => self.delete_branch(children, value, path)?,
			Node::Leaf {
				path: node_path,
				value,
			} => {
				if node_path[..] == *path {
					Node::Blank
				} else {
					Node::Leaf {
						path: node_path,
						value,
					}
				}
			}
			Node::Extension {
				path: node_path,
				child,
			} => self.delete_kv(node_path, child, path)?,
		};
		Ok(self.write_node(new_node))
	}

	fn delete_branch(
		&mut self,
		mut children: Box<[NodeRef; 16]>,
		value: Option<Vec<u8>>,
		path: &[u8],
	) -> Result<Node, TrieError> {
		if path.is_empty() {
			return self.normalize_branch(children, None);
		}
		let index = path[0] as usize;
		let child = mem::replace(&mut children[index], NodeRef::Empty);
		let new_child = self.delete_at(child, &path[1..])?;
		let removed = matches!(new_child, NodeRef::Empty);
		children[index] = new_child;
		if removed {
			self.normalize_branch(children, value)
		} else {
			Ok(Node::Branch { children, value })
		}
	}

	/// Collapse a branch that may have dropped to a single occupant.
	fn normalize_branch(
		&mut self,
		mut children: Box<[NodeRef; 16]>,
		value: Option<Vec<u8>>,
	) -> Result<Node, TrieError> {
		let occupied = children
			.iter()
			.filter(|child| !matches!(child, NodeRef::Empty))
			.count() + usize::from(value.is_some());
		if occupied > 1 {
			return Ok(Node::Branch { children, value });
		}
		if let Some(value) = value {
			return Ok(Node::Leaf {
				path: Vec::new(),
				value,
			});
		}
		for (index, slot) in children.iter_mut().enumerate() {
			if matches!(slot, NodeRef::Empty) {
				continue;
			}
			let child = mem::replace(slot, NodeRef::Empty);
			return Ok(match self.take_node(child)? {
				// The remaining child absorbs the branch nibble.
				Node::Leaf { mut path, value } => {
					path.insert(0, index as u8);
					Node::Leaf { path, value }
				}
				Node::Extension { mut path, child } => {
					path.insert(0, index as u8);
					Node::Extension { path, child }
				}
				branch @ Node::Branch { .. } => {
					let child = self.write_node(branch);
					Node::Extension {
						path: vec![index as u8],
						child,
					}
				}
				Node::Blank => Node::Blank,
			});
		}
		Ok(Node::Blank)
	}

	fn delete_kv(
		&mut self,
		node_path: Vec<u8>,
		child: NodeRef,
		path: &[u8],
	) -> Result<Node, TrieError> {
		if path.len() < node_path.len() || path[..node_path.len()] != node_path[..] {
			// Key is not under this extension.
			return Ok(Node::Extension {
				path: node_path,
				child,
			});
		}
		let new_child = self.delete_at(child, &path[node_path.len()..])?;
		Ok(match self.take_node(new_child)? {
			Node::Blank => Node::Blank,
			// Merge collapsed children into a single node with the
			// concatenated path.
			Node::Leaf {
				path: child_path,
				value,
			} => {
				let mut path = node_path;
				path.extend_from_slice(&child_path);
				Node::Leaf { path, value }
			}
			Node::Extension {
				path: child_path,
				child,
			} => {
				let mut path = node_path;
				path.extend_from_slice(&child_path);
				Node::Extension { path, child }
			}
			branch @ Node::Branch { .. } => {
				let child = self.write_node(branch);
				Node::Extension {
					path: node_path,
					child,
				}
			}
		})
	}
}
