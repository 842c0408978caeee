//! Block structures, header validation and the block-level state
//! transition.

use crate::bloom::Bloom;
use crate::executor::BlockContext;
use crate::params::ChainParams;
use crate::state::{Log, State};
use crate::transaction::{apply_transaction, Transaction, TransactionError};
use ember_trie::{keccak, KVStore, MemoryDB, Trie, TrieError, EMPTY_ROOT};
use primitive_types::{H160, H256, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
	#[error("previous-hash field does not match the parent")]
	InvalidPrevHash,
	#[error("block number is not parent number plus one")]
	InvalidNumber,
	#[error("timestamp is not after the parent's")]
	InvalidTimestamp,
	#[error("difficulty does not match the retarget rule")]
	InvalidDifficulty,
	#[error("gas limit outside the allowed adjustment window")]
	InvalidGasLimit,
	#[error("extra data longer than {0} bytes")]
	ExtraDataTooLong(usize),
	#[error("too many uncles")]
	TooManyUncles,
	#[error("uncle at invalid depth")]
	InvalidUncle,
	#[error("transaction-list root does not match the included transactions")]
	TransactionRootMismatch,
	#[error("receipts root does not match the computed receipts")]
	ReceiptsRootMismatch,
	#[error("header bloom does not match the logs")]
	BloomMismatch,
	#[error("header gas-used does not match execution: header {header}, actual {actual}")]
	GasUsedMismatch { header: u64, actual: u64 },
	#[error("state root mismatch: header {header}, actual {actual}")]
	StateRootMismatch { header: H256, actual: H256 },
	#[error(transparent)]
	Transaction(#[from] TransactionError),
	#[error(transparent)]
	Trie(#[from] TrieError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
	pub prev_hash: H256,
	pub coinbase: H160,
	pub state_root: H256,
	pub tx_list_root: H256,
	pub receipts_root: H256,
	pub bloom: Bloom,
	pub difficulty: U256,
	pub number: u64,
	pub gas_limit: u64,
	pub gas_used: u64,
	pub timestamp: u64,
	pub extra_data: Vec<u8>,
}

impl Default for Header {
	fn default() -> Self {
		Header {
			prev_hash: H256::zero(),
			coinbase: H160::zero(),
			state_root: EMPTY_ROOT,
			tx_list_root: EMPTY_ROOT,
			receipts_root: EMPTY_ROOT,
			bloom: Bloom::new(),
			difficulty: U256::zero(),
			number: 0,
			gas_limit: 0,
			gas_used: 0,
			timestamp: 0,
			extra_data: Vec::new(),
		}
	}
}

impl Header {
	pub fn hash(&self) -> H256 {
		keccak(&rlp::encode(self))
	}
}

impl Encodable for Header {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(12);
		s.append(&self.prev_hash);
		s.append(&self.coinbase);
		s.append(&self.state_root);
		s.append(&self.tx_list_root);
		s.append(&self.receipts_root);
		s.append(&self.bloom);
		s.append(&self.difficulty);
		s.append(&self.number);
		s.append(&self.gas_limit);
		s.append(&self.gas_used);
		s.append(&self.timestamp);
		s.append(&self.extra_data);
	}
}

impl Decodable for Header {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 12 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Header {
			prev_hash: rlp.val_at(0)?,
			coinbase: rlp.val_at(1)?,
			state_root: rlp.val_at(2)?,
			tx_list_root: rlp.val_at(3)?,
			receipts_root: rlp.val_at(4)?,
			bloom: rlp.val_at(5)?,
			difficulty: rlp.val_at(6)?,
			number: rlp.val_at(7)?,
			gas_limit: rlp.val_at(8)?,
			gas_used: rlp.val_at(9)?,
			timestamp: rlp.val_at(10)?,
			extra_data: rlp.val_at(11)?,
		})
	}
}

/// Per-transaction receipt committed to the receipts trie.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Receipt {
	/// State root after the transaction was applied.
	pub state_root: H256,
	/// Cumulative gas used in the block up to and including this
	/// transaction.
	pub gas_used: u64,
	pub bloom: Bloom,
	pub logs: Vec<Log>,
}

impl Receipt {
	pub fn new(state_root: H256, gas_used: u64, logs: Vec<Log>) -> Self {
		let mut bloom = Bloom::new();
		for log in &logs {
			bloom.accrue(&log.bloom());
		}
		Receipt {
			state_root,
			gas_used,
			bloom,
			logs,
		}
	}
}

impl Encodable for Receipt {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(4);
		s.append(&self.state_root);
		s.append(&self.gas_used);
		s.append(&self.bloom);
		s.append_list(&self.logs);
	}
}

impl Decodable for Receipt {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 4 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Receipt {
			state_root: rlp.val_at(0)?,
			gas_used: rlp.val_at(1)?,
			bloom: rlp.val_at(2)?,
			logs: rlp.list_at(3)?,
		})
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
	pub header: Header,
	pub transactions: Vec<Transaction>,
	pub uncles: Vec<Header>,
}

impl Encodable for Block {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(3);
		s.append(&self.header);
		s.append_list(&self.transactions);
		s.append_list(&self.uncles);
	}
}

impl Decodable for Block {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 3 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Block {
			header: rlp.val_at(0)?,
			transactions: rlp.list_at(1)?,
			uncles: rlp.list_at(2)?,
		})
	}
}

/// Build the root of a trie keyed by transaction index over arbitrary
/// RLP-encodable items. Indices are themselves RLP encoded, and the trie
/// is not keyed by hash.
pub fn ordered_root<T: Encodable>(items: &[T]) -> H256 {
	let mut trie = Trie::new(MemoryDB::new());
	for (index, item) in items.iter().enumerate() {
		trie.insert(&rlp::encode(&(index as u64)), &rlp::encode(item))
			.expect("fresh in-memory trie has no missing nodes; qed");
	}
	trie.root_hash()
}

/// Difficulty of a block with the given parent and timestamp.
///
/// The parent difficulty is nudged up or down by `1/2048` of itself,
/// clamped below at the minimum, and the exponential bomb is added once
/// two free periods have passed.
pub fn calc_difficulty(params: &ChainParams, parent: &Header, timestamp: u64) -> U256 {
	let offset = parent.difficulty / U256::from(params.block_diff_factor);
	let delta = timestamp.saturating_sub(parent.timestamp);

	let sign: i64 = if params.is_homestead(parent.number + 1) {
		(1 - (delta / params.homestead_diff_adjustment_cutoff) as i64).max(-99)
	} else if delta < params.diff_adjustment_cutoff {
		1
	} else {
		-1
	};

	let adjusted = if sign >= 0 {
		parent.difficulty + offset * U256::from(sign as u64)
	} else {
		parent
			.difficulty
			.saturating_sub(offset * U256::from(sign.unsigned_abs()))
	};
	let floor = parent.difficulty.min(U256::from(params.min_diff));
	let mut difficulty = adjusted.max(floor);

	let period_count = (parent.number + 1) / params.expdiff_period;
	if period_count >= params.expdiff_free_periods {
		let exponent = period_count - params.expdiff_free_periods;
		let bomb = if exponent < 256 {
			U256::one() << exponent
		} else {
			U256::MAX
		};
		difficulty = difficulty
			.saturating_add(bomb)
			.max(U256::from(params.min_diff));
	}
	difficulty
}

/// Gas limit a miner building on `parent` would target: an exponential
/// moving average of usage, floored at the minimum, with the genesis
/// limit acting as an initial ramp target.
pub fn calc_gaslimit(params: &ChainParams, parent: &Header) -> u64 {
	let decay = parent.gas_limit / params.gas_limit_ema_factor;
	let contribution = parent.gas_used * params.gas_limit_usage_nom
		/ params.gas_limit_usage_den
		/ params.gas_limit_ema_factor;
	let mut gas_limit = (parent.gas_limit - decay + contribution).max(params.min_gas_limit);
	if gas_limit < params.genesis_gas_limit {
		gas_limit = params.genesis_gas_limit.min(parent.gas_limit + decay);
	}
	gas_limit
}

/// Whether a child gas limit is within the allowed window around the
/// parent's. Miners may move the limit by at most `1/1024` per block.
pub fn check_gaslimit(params: &ChainParams, parent: &Header, gas_limit: u64) -> bool {
	let diff = gas_limit.abs_diff(parent.gas_limit);
	diff <= parent.gas_limit / params.gas_limit_adjmax_factor && gas_limit >= params.min_gas_limit
}

fn validate_header(
	params: &ChainParams,
	parent: &Header,
	header: &Header,
) -> Result<(), BlockError> {
	if header.prev_hash != parent.hash() {
		return Err(BlockError::InvalidPrevHash);
	}
	if header.number != parent.number + 1 {
		return Err(BlockError::InvalidNumber);
	}
	if header.timestamp <= parent.timestamp {
		return Err(BlockError::InvalidTimestamp);
	}
	if header.difficulty != calc_difficulty(params, parent, header.timestamp) {
		return Err(BlockError::InvalidDifficulty);
	}
	if !check_gaslimit(params, parent, header.gas_limit) {
		return Err(BlockError::InvalidGasLimit);
	}
	if header.extra_data.len() > params.max_extra_data {
		return Err(BlockError::ExtraDataTooLong(params.max_extra_data));
	}
	Ok(())
}

/// Apply a whole block on top of `parent`'s state and verify the header
/// commitments. Returns the receipts of the included transactions.
///
/// `ancestor_hashes` are the hashes of the blocks before the parent,
/// most recent first; together with the parent they form the `BLOCKHASH`
/// window, so pass up to 255 of them. The state must be opened at
/// `parent.state_root` before calling; on error it is left partially
/// modified and should be discarded.
pub fn block_state_transition<D: KVStore + Clone>(
	state: &mut State<D>,
	params: &ChainParams,
	parent: &Header,
	ancestor_hashes: &[H256],
	block: &Block,
) -> Result<Vec<Receipt>, BlockError> {
	let header = &block.header;
	validate_header(params, parent, header)?;
	if block.uncles.len() > params.max_uncles {
		return Err(BlockError::TooManyUncles);
	}

	let mut prev_hashes = Vec::with_capacity(ancestor_hashes.len() + 1);
	prev_hashes.push(parent.hash());
	prev_hashes.extend_from_slice(ancestor_hashes);
	let context = BlockContext {
		coinbase: header.coinbase,
		timestamp: header.timestamp,
		number: header.number,
		difficulty: header.difficulty,
		gas_limit: header.gas_limit,
		prev_hashes,
	};
	let config = params.config(header.number);

	let mut receipts = Vec::with_capacity(block.transactions.len());
	let mut gas_used = 0u64;
	let mut bloom = Bloom::new();
	for tx in &block.transactions {
		let outcome = apply_transaction(state, &context, &config, tx, gas_used)?;
		gas_used += outcome.gas_used;
		let receipt = Receipt::new(outcome.state_root, gas_used, outcome.logs);
		bloom.accrue(&receipt.bloom);
		receipts.push(receipt);
	}

	// Mining rewards: the coinbase earns the block reward plus a fraction
	// per included uncle, and each uncle's coinbase earns a reward shrinking
	// with its depth below this block.
	let udpf = params.uncle_depth_penalty_factor;
	for uncle in &block.uncles {
		let depth = header.number.saturating_sub(uncle.number);
		if depth == 0 || depth > udpf {
			return Err(BlockError::InvalidUncle);
		}
		let reward = params.block_reward * U256::from(udpf - depth) / U256::from(udpf);
		state.add_balance(uncle.coinbase, reward);
	}
	state.add_balance(
		header.coinbase,
		params.block_reward + params.nephew_reward * U256::from(block.uncles.len() as u64),
	);

	let state_root = state.commit()?;
	log::debug!(
		"block {} applied: {} transactions, {} gas",
		header.number,
		block.transactions.len(),
		gas_used
	);

	if header.tx_list_root != ordered_root(&block.transactions) {
		return Err(BlockError::TransactionRootMismatch);
	}
	if header.receipts_root != ordered_root(&receipts) {
		return Err(BlockError::ReceiptsRootMismatch);
	}
	if header.bloom != bloom {
		return Err(BlockError::BloomMismatch);
	}
	if header.gas_used != gas_used {
		return Err(BlockError::GasUsedMismatch {
			header: header.gas_used,
			actual: gas_used,
		});
	}
	if header.state_root != state_root {
		return Err(BlockError::StateRootMismatch {
			header: header.state_root,
			actual: state_root,
		});
	}
	Ok(receipts)
}
