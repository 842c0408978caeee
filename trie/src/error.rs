use primitive_types::H256;
use thiserror::Error;

/// Errors surfaced by trie reads and writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrieError {
	/// A node referenced by hash is absent from the backing store. For a
	/// full store this means corruption; during proof verification it
	/// means the proof is incomplete.
	#[error("trie node {0:?} is missing from the database")]
	MissingNode(H256),
	/// A stored node failed to decode.
	#[error("malformed trie node rlp: {0}")]
	Rlp(#[from] rlp::DecoderError),
	/// A hex-prefix encoded path carried invalid flags.
	#[error("invalid hex-prefix flags: {0:#x}")]
	InvalidHexPrefix(u8),
	/// Proof verification failed.
	#[error("proof does not prove the requested key")]
	InvalidProof,
}
