use crate::nibbles::{hex_prefix_decode, hex_prefix_encode};
use crate::TrieError;
use primitive_types::H256;
use rlp::{Rlp, RlpStream};
use sha3::{Digest, Keccak256};

/// Root hash of an empty trie: `keccak(rlp(""))`.
pub const EMPTY_ROOT: H256 = H256([
	0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
	0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
	0xb4, 0x21,
]);

/// Keccak-256 convenience over raw bytes.
pub fn keccak(data: &[u8]) -> H256 {
	H256::from_slice(Keccak256::digest(data).as_slice())
}

/// A decoded trie node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
	/// Absent node.
	Blank,
	/// Terminal node holding a value at the remaining path.
	Leaf { path: Vec<u8>, value: Vec<u8> },
	/// Shared path segment pointing at a single child.
	Extension { path: Vec<u8>, child: NodeRef },
	/// Sixteen-way fan-out with an optional value for keys ending here.
	Branch {
		children: Box<[NodeRef; 16]>,
		value: Option<Vec<u8>>,
	},
}

/// Reference to a child node. Nodes whose encoding is shorter than 32
/// bytes are inlined into their parent; all others are stored in the
/// backing database keyed by the keccak of their encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeRef {
	Empty,
	Hash(H256),
	Inline(Box<Node>),
}

pub fn empty_children() -> Box<[NodeRef; 16]> {
	Box::new([
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
		NodeRef::Empty,
	])
}

fn append_ref(stream: &mut RlpStream, node_ref: &NodeRef) {
	match node_ref {
		NodeRef::Empty => {
			stream.append_empty_data();
		}
		NodeRef::Hash(hash) => {
			stream.append(hash);
		}
		NodeRef::Inline(node) => {
			stream.append_raw(&encode_node(node), 1);
		}
	}
}

/// RLP-encode a node.
pub fn encode_node(node: &Node) -> Vec<u8> {
	let mut stream = RlpStream::new();
	match node {
		Node::Blank => {
			stream.append_empty_data();
		}
		Node::Leaf { path, value } => {
			stream.begin_list(2);
			stream.append(&hex_prefix_encode(path, true));
			stream.append(value);
		}
		Node::Extension { path, child } => {
			stream.begin_list(2);
			stream.append(&hex_prefix_encode(path, false));
			append_ref(&mut stream, child);
		}
		Node::Branch { children, value } => {
			stream.begin_list(17);
			for child in children.iter() {
				append_ref(&mut stream, child);
			}
			match value {
				Some(value) => stream.append(value),
				None => stream.append_empty_data(),
			};
		}
	}
	stream.out().to_vec()
}

fn decode_ref(rlp: &Rlp) -> Result<NodeRef, TrieError> {
	if rlp.is_list() {
		Ok(NodeRef::Inline(Box::new(decode_node(rlp)?)))
	} else {
		let data = rlp.data()?;
		match data.len() {
			0 => Ok(NodeRef::Empty),
			32 => Ok(NodeRef::Hash(H256::from_slice(data))),
			_ => Err(TrieError::Rlp(rlp::DecoderError::Custom(
				"node reference must be empty or a 32-byte hash",
			))),
		}
	}
}

/// Decode a node from an `Rlp` view.
pub fn decode_node(rlp: &Rlp) -> Result<Node, TrieError> {
	if !rlp.is_list() {
		if rlp.data()?.is_empty() {
			return Ok(Node::Blank);
		}
		return Err(TrieError::Rlp(rlp::DecoderError::RlpExpectedToBeList));
	}

	match rlp.item_count()? {
		2 => {
			let (path, is_leaf) = hex_prefix_decode(rlp.at(0)?.data()?)?;
			if is_leaf {
				Ok(Node::Leaf {
					path,
					value: rlp.at(1)?.data()?.to_vec(),
				})
			} else {
				Ok(Node::Extension {
					path,
					child: decode_ref(&rlp.at(1)?)?,
				})
			}
		}
		17 => {
			let mut children = empty_children();
			for (index, child) in children.iter_mut().enumerate() {
				*child = decode_ref(&rlp.at(index)?)?;
			}
			let value = rlp.at(16)?.data()?;
			Ok(Node::Branch {
				children,
				value: if value.is_empty() {
					None
				} else {
					Some(value.to_vec())
				},
			})
		}
		_ => Err(TrieError::Rlp(rlp::DecoderError::RlpIncorrectListLen)),
	}
}

/// Decode a node from raw stored bytes.
pub fn decode_node_bytes(raw: &[u8]) -> Result<Node, TrieError> {
	decode_node(&Rlp::new(raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_root_matches_keccak_of_null_rlp() {
		let mut stream = RlpStream::new();
		stream.append_empty_data();
		assert_eq!(keccak(&stream.out()), EMPTY_ROOT);
	}

	#[test]
	fn leaf_roundtrip() {
		let node = Node::Leaf {
			path: vec![6, 4, 6, 15, 6, 7],
			value: b"puppy".to_vec(),
		};
		let encoded = encode_node(&node);
		assert_eq!(decode_node_bytes(&encoded), Ok(node));
	}

	#[test]
	fn branch_roundtrip_with_inline_and_hash_children() {
		let mut children = empty_children();
		children[3] = NodeRef::Inline(Box::new(Node::Leaf {
			path: vec![1],
			value: b"a".to_vec(),
		}));
		children[10] = NodeRef::Hash(EMPTY_ROOT);
		let node = Node::Branch {
			children,
			value: Some(b"here".to_vec()),
		};
		let encoded = encode_node(&node);
		assert_eq!(decode_node_bytes(&encoded), Ok(node));
	}

	#[test]
	fn extension_roundtrip() {
		let node = Node::Extension {
			path: vec![0, 1, 2],
			child: NodeRef::Hash(EMPTY_ROOT),
		};
		let encoded = encode_node(&node);
		assert_eq!(decode_node_bytes(&encoded), Ok(node));
	}
}
