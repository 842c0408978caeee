//! Signed transactions and their application against the state.

use crate::executor::{BlockContext, Executor, Message, MessageResult, TxContext};
use crate::state::{Log, State};
use ember_gasometer::{consts, costs, Config};
use ember_trie::{keccak, KVStore, TrieError};
use primitive_types::{H160, H256, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::HashSet;
use thiserror::Error;

/// Validation failures checked before any gas is charged. None of these
/// mutate the state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
	#[error("invalid transaction signature")]
	InvalidSignature,
	#[error("invalid nonce: expected {expected}, got {got}")]
	InvalidNonce { expected: U256, got: U256 },
	#[error("start gas {got} below intrinsic cost {required}")]
	InsufficientStartGas { required: u64, got: u64 },
	#[error("balance {got} below required {required}")]
	InsufficientBalance { required: U256, got: U256 },
	#[error("transaction exceeds the block gas limit")]
	BlockGasLimitReached,
	#[error("state commit failed: {0}")]
	Trie(#[from] TrieError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
	pub nonce: U256,
	pub gas_price: U256,
	pub start_gas: u64,
	/// `None` creates a contract.
	pub to: Option<H160>,
	pub value: U256,
	pub data: Vec<u8>,
	pub v: u64,
	pub r: U256,
	pub s: U256,
}

impl Transaction {
	/// An unsigned transaction; call [`Transaction::sign`] before use.
	pub fn new(
		nonce: U256,
		gas_price: U256,
		start_gas: u64,
		to: Option<H160>,
		value: U256,
		data: Vec<u8>,
	) -> Self {
		Transaction {
			nonce,
			gas_price,
			start_gas,
			to,
			value,
			data,
			v: 0,
			r: U256::zero(),
			s: U256::zero(),
		}
	}

	fn append_unsigned(&self, s: &mut RlpStream) {
		s.append(&self.nonce);
		s.append(&self.gas_price);
		s.append(&self.start_gas);
		match &self.to {
			Some(to) => s.append(to),
			None => s.append_empty_data(),
		};
		s.append(&self.value);
		s.append(&self.data);
	}

	/// Hash signed by the sender: keccak of the six payload fields.
	pub fn signing_hash(&self) -> H256 {
		let mut stream = RlpStream::new_list(6);
		self.append_unsigned(&mut stream);
		keccak(&stream.out())
	}

	pub fn hash(&self) -> H256 {
		keccak(&rlp::encode(self))
	}

	/// Sign in place with the given secret key.
	pub fn sign(&mut self, secret: &H256) -> Result<(), TransactionError> {
		let secret = libsecp256k1::SecretKey::parse(secret.as_fixed_bytes())
			.map_err(|_| TransactionError::InvalidSignature)?;
		let message = libsecp256k1::Message::parse(self.signing_hash().as_fixed_bytes());
		let (signature, recovery_id) = libsecp256k1::sign(&message, &secret);
		let serialized = signature.serialize();
		self.v = 27 + recovery_id.serialize() as u64;
		self.r = U256::from_big_endian(&serialized[..32]);
		self.s = U256::from_big_endian(&serialized[32..]);
		Ok(())
	}

	/// Recover the sender address from the signature.
	pub fn sender(&self) -> Result<H160, TransactionError> {
		if self.v < 27 || self.v > 28 {
			return Err(TransactionError::InvalidSignature);
		}
		let mut serialized = [0u8; 64];
		self.r.to_big_endian(&mut serialized[..32]);
		self.s.to_big_endian(&mut serialized[32..]);
		let signature = libsecp256k1::Signature::parse_standard(&serialized)
			.map_err(|_| TransactionError::InvalidSignature)?;
		let recovery_id = libsecp256k1::RecoveryId::parse((self.v - 27) as u8)
			.map_err(|_| TransactionError::InvalidSignature)?;
		let message = libsecp256k1::Message::parse(self.signing_hash().as_fixed_bytes());
		let pubkey = libsecp256k1::recover(&message, &signature, &recovery_id)
			.map_err(|_| TransactionError::InvalidSignature)?;
		Ok(H160::from(keccak(&pubkey.serialize()[1..])))
	}

	/// Gas consumed before any code runs.
	pub fn intrinsic_gas(&self) -> u64 {
		costs::transaction_cost(&self.data)
	}
}

impl Encodable for Transaction {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(9);
		self.append_unsigned(s);
		s.append(&self.v);
		s.append(&self.r);
		s.append(&self.s);
	}
}

impl Decodable for Transaction {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 9 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		let to_rlp = rlp.at(3)?;
		let to = if to_rlp.data()?.is_empty() {
			None
		} else {
			Some(to_rlp.as_val()?)
		};
		Ok(Transaction {
			nonce: rlp.val_at(0)?,
			gas_price: rlp.val_at(1)?,
			start_gas: rlp.val_at(2)?,
			to,
			value: rlp.val_at(4)?,
			data: rlp.val_at(5)?,
			v: rlp.val_at(6)?,
			r: rlp.val_at(7)?,
			s: rlp.val_at(8)?,
		})
	}
}

/// Result of applying one transaction.
#[derive(Clone, Debug)]
pub struct TransactionOutcome {
	pub success: bool,
	/// Gas charged after applying refunds.
	pub gas_used: u64,
	pub output: Vec<u8>,
	/// Address of the created contract, for creation transactions.
	pub contract_address: Option<H160>,
	pub logs: Vec<Log>,
	/// State root after this transaction committed.
	pub state_root: H256,
}

/// Validate and execute one transaction against the state.
///
/// Validation failures return an error without touching the state. Once
/// execution starts, a failing message consumes all of `start_gas`, but
/// the nonce increment and the up-front gas purchase persist. Refunds
/// (storage clears, suicides) are capped at half the gas actually used.
pub fn apply_transaction<D: KVStore + Clone>(
	state: &mut State<D>,
	block: &BlockContext,
	config: &Config,
	tx: &Transaction,
	block_gas_used: u64,
) -> Result<TransactionOutcome, TransactionError> {
	let sender = tx.sender()?;

	let intrinsic = tx.intrinsic_gas();
	if tx.start_gas < intrinsic {
		return Err(TransactionError::InsufficientStartGas {
			required: intrinsic,
			got: tx.start_gas,
		});
	}

	let nonce = state.nonce(sender);
	if nonce != tx.nonce {
		return Err(TransactionError::InvalidNonce {
			expected: nonce,
			got: tx.nonce,
		});
	}

	let balance = state.balance(sender);
	let overflow = TransactionError::InsufficientBalance {
		required: U256::MAX,
		got: balance,
	};
	let gas_cost = tx
		.gas_price
		.checked_mul(U256::from(tx.start_gas))
		.ok_or(overflow)?;
	let required = gas_cost
		.checked_add(tx.value)
		.ok_or(TransactionError::InsufficientBalance {
			required: U256::MAX,
			got: balance,
		})?;
	if balance < required {
		return Err(TransactionError::InsufficientBalance {
			required,
			got: balance,
		});
	}

	if tx
		.start_gas
		.checked_add(block_gas_used)
		.map_or(true, |total| total > block.gas_limit)
	{
		return Err(TransactionError::BlockGasLimitReached);
	}

	log::trace!(
		"applying transaction from {:?} to {:?}, start gas {}",
		sender,
		tx.to,
		tx.start_gas
	);

	// Buy the gas. This survives even a failed execution.
	state.reset_transaction_state();
	state.inc_nonce(sender);
	state.sub_balance(sender, gas_cost);

	let message_gas = tx.start_gas - intrinsic;
	let tx_context = TxContext {
		origin: sender,
		gas_price: tx.gas_price,
	};
	let (result, contract_address) = {
		let mut executor = Executor::new(state, block, tx_context, config.clone());
		match tx.to {
			Some(to) => {
				let msg = Message {
					sender,
					to,
					code_address: to,
					value: tx.value,
					apparent_value: tx.value,
					gas: message_gas,
					data: tx.data.clone(),
					depth: 0,
					transfers_value: true,
				};
				(executor.apply_msg(msg), None)
			}
			None => {
				let (result, address) =
					executor.create_contract(sender, tx.value, message_gas, tx.data.clone(), 0);
				(result, address)
			}
		}
	};

	let (success, gas_used, output) = match result {
		MessageResult::Success {
			gas_remaining,
			output,
		} => {
			let suicides: HashSet<H160> = state.suicides().iter().copied().collect();
			let refunds =
				state.refunds() + suicides.len() as u64 * consts::G_SUICIDE_REFUND;
			let gas_used = tx.start_gas - gas_remaining;
			let gas_remaining = gas_remaining + refunds.min(gas_used / 2);
			let gas_used = tx.start_gas - gas_remaining;

			state.add_balance(sender, tx.gas_price * U256::from(gas_remaining));
			state.add_balance(block.coinbase, tx.gas_price * U256::from(gas_used));
			for address in suicides {
				state.del_account(address);
			}
			(true, gas_used, output)
		}
		MessageResult::Failure { output, .. } => {
			// The whole gas allowance goes to the coinbase.
			state.add_balance(block.coinbase, gas_cost);
			(false, tx.start_gas, output)
		}
	};

	let logs = state.take_logs();
	let state_root = state.commit()?;

	Ok(TransactionOutcome {
		success,
		gas_used,
		output,
		contract_address,
		logs,
		state_root,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use ember_trie::MemoryDB;

	fn secret(n: u8) -> H256 {
		H256::repeat_byte(n)
	}

	fn sender_of(secret: &H256) -> H160 {
		let key = libsecp256k1::SecretKey::parse(secret.as_fixed_bytes()).unwrap();
		let pubkey = libsecp256k1::PublicKey::from_secret_key(&key);
		H160::from(keccak(&pubkey.serialize()[1..]))
	}

	fn block() -> BlockContext {
		BlockContext {
			coinbase: H160::repeat_byte(0xcb),
			timestamp: 100,
			number: 1,
			difficulty: U256::from(131_072),
			gas_limit: 3_141_592,
			prev_hashes: vec![H256::repeat_byte(0x41)],
		}
	}

	fn signed(secret_key: &H256, nonce: u64, to: Option<H160>, value: u64, data: Vec<u8>) -> Transaction {
		let mut tx = Transaction::new(
			U256::from(nonce),
			U256::one(),
			100_000,
			to,
			U256::from(value),
			data,
		);
		tx.sign(secret_key).unwrap();
		tx
	}

	#[test]
	fn sender_recovers_after_signing() {
		let secret_key = secret(0x17);
		let tx = signed(&secret_key, 0, Some(H160::repeat_byte(2)), 5, vec![]);
		assert_eq!(tx.sender().unwrap(), sender_of(&secret_key));
	}

	#[test]
	fn tampering_changes_the_sender() {
		let secret_key = secret(0x17);
		let mut tx = signed(&secret_key, 0, Some(H160::repeat_byte(2)), 5, vec![]);
		tx.value = U256::from(6);
		// Recovery either fails or yields a different address.
		match tx.sender() {
			Ok(recovered) => assert_ne!(recovered, sender_of(&secret_key)),
			Err(e) => assert_eq!(e, TransactionError::InvalidSignature),
		}
	}

	#[test]
	fn rlp_roundtrip() {
		let secret_key = secret(0x01);
		let tx = signed(&secret_key, 3, Some(H160::repeat_byte(9)), 42, vec![1, 2, 3]);
		let encoded = rlp::encode(&tx);
		assert_eq!(rlp::decode::<Transaction>(&encoded), Ok(tx));
	}

	#[test]
	fn creation_rlp_uses_empty_to() {
		let secret_key = secret(0x01);
		let tx = signed(&secret_key, 0, None, 0, vec![0x60, 0x00]);
		let decoded = rlp::decode::<Transaction>(&rlp::encode(&tx)).unwrap();
		assert_eq!(decoded.to, None);
	}

	#[test]
	fn value_transfer_charges_intrinsic_gas() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let recipient = H160::repeat_byte(0x99);
		let db = MemoryDB::new();
		let mut state = State::new(db);
		state.set_balance(sender, U256::from(10_000_000));

		let tx = signed(&secret_key, 0, Some(recipient), 1234, vec![]);
		let block = block();
		let outcome =
			apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0).unwrap();

		assert!(outcome.success);
		assert_eq!(outcome.gas_used, 21_000);
		assert_eq!(state.balance(recipient), U256::from(1234));
		assert_eq!(
			state.balance(sender),
			U256::from(10_000_000 - 1234 - 21_000)
		);
		assert_eq!(state.balance(block.coinbase), U256::from(21_000));
		assert_eq!(state.nonce(sender), U256::one());
	}

	#[test]
	fn wrong_nonce_is_rejected_without_side_effects() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));

		let tx = signed(&secret_key, 5, Some(H160::repeat_byte(0x99)), 1, vec![]);
		let block = block();
		let err = apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0)
			.unwrap_err();
		assert_eq!(
			err,
			TransactionError::InvalidNonce {
				expected: U256::zero(),
				got: U256::from(5)
			}
		);
		assert_eq!(state.balance(sender), U256::from(10_000_000));
		assert_eq!(state.nonce(sender), U256::zero());
	}

	#[test]
	fn insufficient_balance_is_rejected() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(1000));

		let tx = signed(&secret_key, 0, Some(H160::repeat_byte(0x99)), 1, vec![]);
		let block = block();
		let err = apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0)
			.unwrap_err();
		assert!(matches!(err, TransactionError::InsufficientBalance { .. }));
	}

	#[test]
	fn start_gas_below_intrinsic_is_rejected() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));

		let mut tx = Transaction::new(
			U256::zero(),
			U256::one(),
			20_000,
			Some(H160::repeat_byte(0x99)),
			U256::zero(),
			vec![],
		);
		tx.sign(&secret_key).unwrap();
		let block = block();
		let err = apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0)
			.unwrap_err();
		assert_eq!(
			err,
			TransactionError::InsufficientStartGas {
				required: 21_000,
				got: 20_000
			}
		);
	}

	#[test]
	fn block_gas_limit_counts_start_gas() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));

		let tx = signed(&secret_key, 0, Some(H160::repeat_byte(0x99)), 1, vec![]);
		let block = block();
		let err = apply_transaction(
			&mut state,
			&block,
			&Config::frontier(),
			&tx,
			block.gas_limit - 50_000,
		)
		.unwrap_err();
		assert_eq!(err, TransactionError::BlockGasLimitReached);
	}

	#[test]
	fn huge_start_gas_cannot_overflow_the_block_limit_check() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(1000));

		// A free-gas transaction sails past the balance check with an
		// absurd start gas; the limit check must not wrap around.
		let mut tx = Transaction::new(
			U256::zero(),
			U256::zero(),
			u64::MAX,
			Some(H160::repeat_byte(0x99)),
			U256::zero(),
			vec![],
		);
		tx.sign(&secret_key).unwrap();
		let block = block();
		let err = apply_transaction(&mut state, &block, &Config::frontier(), &tx, 1)
			.unwrap_err();
		assert_eq!(err, TransactionError::BlockGasLimitReached);
		assert_eq!(state.nonce(sender), U256::zero());
	}

	#[test]
	fn failed_execution_consumes_all_gas_but_keeps_nonce() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let target = H160::repeat_byte(0x99);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));
		// Target code hits an undefined opcode.
		state.set_code(target, vec![0xfe]);

		let tx = signed(&secret_key, 0, Some(target), 500, vec![]);
		let block = block();
		let outcome =
			apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0).unwrap();

		assert!(!outcome.success);
		assert_eq!(outcome.gas_used, 100_000);
		assert_eq!(state.nonce(sender), U256::one());
		// Value transfer reverted, the full gas allowance was spent.
		assert_eq!(state.balance(target), U256::zero());
		assert_eq!(state.balance(sender), U256::from(10_000_000 - 100_000));
		assert_eq!(state.balance(block.coinbase), U256::from(100_000));
	}

	#[test]
	fn storage_clear_refund_is_applied() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let target = H160::repeat_byte(0x99);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));
		state.set_storage(target, H256::zero(), H256::from_low_u64_be(1));
		// PUSH1 0, PUSH1 0, SSTORE, STOP: clears the slot.
		state.set_code(target, vec![0x60, 0x00, 0x60, 0x00, 0x55, 0x00]);

		let tx = signed(&secret_key, 0, Some(target), 0, vec![]);
		let block = block();
		let outcome =
			apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0).unwrap();

		assert!(outcome.success);
		// Used before refund: 21000 + 5006. The 15000 refund is capped at
		// half of that.
		let used_pre_refund = 21_000 + 5_006;
		assert_eq!(outcome.gas_used, used_pre_refund - used_pre_refund / 2);
	}

	#[test]
	fn creation_transaction_deploys_code() {
		let secret_key = secret(0x22);
		let sender = sender_of(&secret_key);
		let mut state = State::new(MemoryDB::new());
		state.set_balance(sender, U256::from(10_000_000));

		// Init code returning one zero byte of runtime code.
		let init = vec![0x60, 0x00, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];
		let tx = signed(&secret_key, 0, None, 0, init);
		let block = block();
		let outcome =
			apply_transaction(&mut state, &block, &Config::frontier(), &tx, 0).unwrap();

		assert!(outcome.success);
		let address = outcome.contract_address.unwrap();
		assert_eq!(
			address,
			crate::executor::create_address(sender, U256::zero())
		);
		assert_eq!(*state.code(address), vec![0x00]);
		assert_eq!(state.nonce(sender), U256::one());
	}
}
