//! Light-client proofs of transaction inclusion.
//!
//! The proof is the list of trie nodes on the path from the transaction
//! trie root to the indexed entry, verifiable against the header's
//! transaction-list root alone.

use crate::block::Block;
use crate::transaction::Transaction;
use ember_trie::{MemoryDB, Trie, TrieError};
use primitive_types::H256;

/// Prove that transaction `index` of `block` is committed to by its
/// transaction-list root. Returns `None` for an out-of-range index.
pub fn mk_transaction_proof(block: &Block, index: usize) -> Option<Vec<Vec<u8>>> {
	if index >= block.transactions.len() {
		return None;
	}
	let mut trie = Trie::new(MemoryDB::new());
	for (i, tx) in block.transactions.iter().enumerate() {
		trie.insert(&rlp::encode(&(i as u64)), &rlp::encode(tx))
			.expect("fresh in-memory trie has no missing nodes; qed");
	}
	trie.prove(&rlp::encode(&(index as u64))).ok()
}

/// Check a transaction proof against a transaction-list root. Returns the
/// proven transaction, or `None` if the proof shows the index absent.
pub fn verify_transaction_proof(
	tx_list_root: H256,
	index: usize,
	proof: &[Vec<u8>],
) -> Result<Option<Transaction>, TrieError> {
	let value = ember_trie::verify_proof(tx_list_root, &rlp::encode(&(index as u64)), proof)?;
	match value {
		Some(encoded) => {
			let tx = rlp::decode(&encoded)
				.map_err(|_| TrieError::InvalidProof)?;
			Ok(Some(tx))
		}
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::{ordered_root, Header};
	use primitive_types::{H160, U256};

	fn sample_block(count: u64) -> Block {
		let transactions: Vec<Transaction> = (0..count)
			.map(|nonce| {
				let mut tx = Transaction::new(
					U256::from(nonce),
					U256::one(),
					21_000,
					Some(H160::repeat_byte(nonce as u8)),
					U256::from(100 + nonce),
					vec![],
				);
				tx.v = 27;
				tx.r = U256::one();
				tx.s = U256::one();
				tx
			})
			.collect();
		let mut header = Header::default();
		header.tx_list_root = ordered_root(&transactions);
		Block {
			header,
			transactions,
			uncles: Vec::new(),
		}
	}

	#[test]
	fn proof_roundtrip() {
		let block = sample_block(5);
		for index in 0..5 {
			let proof = mk_transaction_proof(&block, index).unwrap();
			let proven =
				verify_transaction_proof(block.header.tx_list_root, index, &proof)
					.unwrap()
					.unwrap();
			assert_eq!(proven, block.transactions[index]);
		}
	}

	#[test]
	fn out_of_range_index_has_no_proof() {
		let block = sample_block(3);
		assert!(mk_transaction_proof(&block, 3).is_none());
	}

	#[test]
	fn tampered_proof_is_rejected() {
		let block = sample_block(5);
		let mut proof = mk_transaction_proof(&block, 2).unwrap();
		proof[0][0] ^= 0x01;
		assert_eq!(
			verify_transaction_proof(block.header.tx_list_root, 2, &proof),
			Err(TrieError::InvalidProof)
		);
	}

	#[test]
	fn proof_against_the_wrong_root_is_rejected() {
		let block = sample_block(5);
		let proof = mk_transaction_proof(&block, 2).unwrap();
		assert_eq!(
			verify_transaction_proof(H256::repeat_byte(0x13), 2, &proof),
			Err(TrieError::InvalidProof)
		);
	}
}
