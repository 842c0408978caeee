//! Message execution: drives the interpreter against the world state,
//! accounting gas per frame.
//!
//! Static opcode costs are charged per straight-line chunk when execution
//! enters the chunk; operand-dependent costs are charged in
//! [`Handler::pre_validate`] by peeking at the stack just before the
//! opcode runs. Sub-calls and creations recurse synchronously through the
//! [`Handler`] implementation, each with its own frame and gasometer.

use crate::precompile;
use crate::state::{Log, State};
use ember_gasometer::{consts, costs, ChunkMap, Config, Gasometer};
use ember_runtime::{
	CallScheme, Context, CreateScheme, ExitError, ExitReason, ExitSucceed, Handler, Machine,
	Opcode, Runtime, Transfer,
};
use ember_trie::{keccak, KVStore};
use primitive_types::{H160, H256, U256};
use rlp::RlpStream;
use std::collections::HashMap;
use std::rc::Rc;

/// Block-level environment visible to the interpreter.
#[derive(Clone, Debug)]
pub struct BlockContext {
	pub coinbase: H160,
	pub timestamp: u64,
	pub number: u64,
	pub difficulty: U256,
	pub gas_limit: u64,
	/// Ancestor hashes for `BLOCKHASH`, most recent first.
	pub prev_hashes: Vec<H256>,
}

/// Transaction-level environment: fixed for every frame of one
/// transaction.
#[derive(Clone, Debug)]
pub struct TxContext {
	pub origin: H160,
	pub gas_price: U256,
}

/// One message call or contract creation.
#[derive(Clone, Debug)]
pub struct Message {
	pub sender: H160,
	pub to: H160,
	/// Account whose code runs; differs from `to` for `CALLCODE` and
	/// `DELEGATECALL`.
	pub code_address: H160,
	pub value: U256,
	/// Value reported by `CALLVALUE`; equals `value` except under
	/// `DELEGATECALL`, which inherits the parent's.
	pub apparent_value: U256,
	pub gas: u64,
	pub data: Vec<u8>,
	pub depth: usize,
	pub transfers_value: bool,
}

/// Uniform outcome of a frame: no exception ever crosses a frame
/// boundary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MessageResult {
	Success { gas_remaining: u64, output: Vec<u8> },
	Failure { gas_remaining: u64, output: Vec<u8> },
}

impl MessageResult {
	pub fn is_success(&self) -> bool {
		matches!(self, MessageResult::Success { .. })
	}

	pub fn gas_remaining(&self) -> u64 {
		match self {
			MessageResult::Success { gas_remaining, .. } => *gas_remaining,
			MessageResult::Failure { gas_remaining, .. } => *gas_remaining,
		}
	}

	pub fn output(&self) -> &[u8] {
		match self {
			MessageResult::Success { output, .. } => output,
			MessageResult::Failure { output, .. } => output,
		}
	}
}

/// The address a contract created by `sender` with `nonce` lands at:
/// `keccak(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: H160, nonce: U256) -> H160 {
	let mut stream = RlpStream::new_list(2);
	stream.append(&sender);
	stream.append(&nonce);
	H160::from(keccak(&stream.out()))
}

/// Chunk maps keyed by code hash, so repeated calls into the same
/// contract skip re-analysis. Owned by the executor; dropped with it.
#[derive(Default)]
pub struct ChunkCache {
	inner: HashMap<H256, Rc<ChunkMap>>,
}

impl ChunkCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn analyze(&mut self, code: &[u8]) -> Rc<ChunkMap> {
		self.inner
			.entry(keccak(code))
			.or_insert_with(|| Rc::new(ChunkMap::analyze(code)))
			.clone()
	}
}

struct Frame {
	gasometer: Gasometer,
	chunks: Rc<ChunkMap>,
	depth: usize,
}

pub struct Executor<'a, D: KVStore + Clone> {
	state: &'a mut State<D>,
	block: &'a BlockContext,
	tx: TxContext,
	config: Config,
	chunk_cache: ChunkCache,
	frames: Vec<Frame>,
}

impl<'a, D: KVStore + Clone> Executor<'a, D> {
	pub fn new(
		state: &'a mut State<D>,
		block: &'a BlockContext,
		tx: TxContext,
		config: Config,
	) -> Self {
		Executor {
			state,
			block,
			tx,
			config,
			chunk_cache: ChunkCache::new(),
			frames: Vec::new(),
		}
	}

	pub fn state(&mut self) -> &mut State<D> {
		self.state
	}

	fn frame(&self) -> &Frame {
		self.frames.last().expect("executing inside a frame; qed")
	}

	fn frame_mut(&mut self) -> &mut Frame {
		self.frames
			.last_mut()
			.expect("executing inside a frame; qed")
	}

	/// Apply a message call. Transfers the value, then runs the code of
	/// `msg.code_address` (or a precompile) in the account `msg.to`. State
	/// changes are reverted on failure; the value transfer only survives
	/// success.
	pub fn apply_msg(&mut self, msg: Message) -> MessageResult {
		let snapshot = self.state.snapshot();
		if msg.transfers_value && !self.state.transfer_value(msg.sender, msg.to, msg.value) {
			// Callers check the balance first, so a failed transfer means
			// nothing ran and nothing is owed.
			return MessageResult::Success {
				gas_remaining: msg.gas,
				output: Vec::new(),
			};
		}

		let result = if let Some(index) = precompile::index(msg.code_address) {
			match precompile::execute(index, &msg.data, msg.gas) {
				Some((cost, output)) => MessageResult::Success {
					gas_remaining: msg.gas - cost,
					output,
				},
				None => MessageResult::Failure {
					gas_remaining: 0,
					output: Vec::new(),
				},
			}
		} else {
			let code = self.state.code(msg.code_address);
			if code.is_empty() {
				MessageResult::Success {
					gas_remaining: msg.gas,
					output: Vec::new(),
				}
			} else {
				let context = Context {
					address: msg.to,
					caller: msg.sender,
					apparent_value: msg.apparent_value,
				};
				self.execute_code(code, Rc::new(msg.data), msg.gas, msg.depth, context)
			}
		};

		if !result.is_success() {
			self.state.revert(snapshot);
		}
		result
	}

	/// Create a contract from `init_code`. The new address is derived from
	/// the sender and its nonce; the nonce increment survives a failed
	/// creation. Running out of gas for the code deposit leaves an empty
	/// contract but still counts as success.
	pub fn create_contract(
		&mut self,
		sender: H160,
		value: U256,
		gas: u64,
		init_code: Vec<u8>,
		depth: usize,
	) -> (MessageResult, Option<H160>) {
		if self.tx.origin != sender {
			self.state.inc_nonce(sender);
		}
		let nonce = self.state.nonce(sender) - U256::one();
		let address = create_address(sender, nonce);

		// A pre-existing account at the target keeps only its balance.
		if self.state.exists(address) {
			self.state.set_nonce(address, U256::zero());
			self.state.set_code(address, Vec::new());
			self.state.reset_storage(address);
		}

		let snapshot = self.state.snapshot();
		if !self.state.transfer_value(sender, address, value) {
			return (
				MessageResult::Success {
					gas_remaining: gas,
					output: Vec::new(),
				},
				Some(address),
			);
		}

		let context = Context {
			address,
			caller: sender,
			apparent_value: value,
		};
		let result = self.execute_code(
			Rc::new(init_code),
			Rc::new(Vec::new()),
			gas,
			depth,
			context,
		);

		match result {
			MessageResult::Success {
				gas_remaining,
				output,
			} => {
				if output.is_empty() {
					return (
						MessageResult::Success {
							gas_remaining,
							output: Vec::new(),
						},
						Some(address),
					);
				}
				let deposit = output.len() as u64 * consts::G_CONTRACT_BYTE;
				if gas_remaining >= deposit {
					self.state.set_code(address, output);
					(
						MessageResult::Success {
							gas_remaining: gas_remaining - deposit,
							output: Vec::new(),
						},
						Some(address),
					)
				} else {
					// Code deposit unaffordable: the account stays empty.
					log::debug!(
						"code deposit needs {} gas, only {} left; deploying empty contract",
						deposit,
						gas_remaining
					);
					(
						MessageResult::Success {
							gas_remaining,
							output: Vec::new(),
						},
						Some(address),
					)
				}
			}
			failure => {
				self.state.revert(snapshot);
				(failure, None)
			}
		}
	}

	fn execute_code(
		&mut self,
		code: Rc<Vec<u8>>,
		data: Rc<Vec<u8>>,
		gas: u64,
		depth: usize,
		context: Context,
	) -> MessageResult {
		let chunks = self.chunk_cache.analyze(&code);
		self.frames.push(Frame {
			gasometer: Gasometer::new(gas),
			chunks,
			depth,
		});
		let mut runtime = Runtime::new(
			code,
			data,
			self.config.stack_limit,
			self.config.memory_limit,
			context,
		);
		let reason = runtime.run(self);
		let frame = self.frames.pop().expect("frame pushed above; qed");

		match reason {
			ExitReason::Succeed(_) => MessageResult::Success {
				gas_remaining: frame.gasometer.gas(),
				output: runtime.machine().return_value(),
			},
			// A frame failure consumes all of the frame's gas.
			ExitReason::Error(_) => MessageResult::Failure {
				gas_remaining: 0,
				output: Vec::new(),
			},
		}
	}

	/// Charge the dynamic portion of the opcode at `position`, peeking its
	/// operands on the stack. The chunk precondition guarantees the
	/// operands are present.
	fn record_dynamic_cost(
		&mut self,
		context: &Context,
		machine: &Machine,
		position: usize,
	) -> Result<(), ExitError> {
		let opcode = match machine.code().get(position) {
			Some(byte) => Opcode(*byte),
			None => return Ok(()),
		};
		let stack = machine.stack();
		let frame = self
			.frames
			.last_mut()
			.expect("pre_validate inside a frame; qed");

		match opcode {
			Opcode::SHA3 => {
				let offset = stack.peek(0)?;
				let len = stack.peek(1)?;
				frame.gasometer.record_cost(costs::sha3_cost(len)?)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::CALLDATACOPY | Opcode::CODECOPY => {
				let offset = stack.peek(0)?;
				let len = stack.peek(2)?;
				frame.gasometer.record_cost(costs::copy_cost(len)?)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::EXTCODECOPY => {
				let offset = stack.peek(1)?;
				let len = stack.peek(3)?;
				frame.gasometer.record_cost(costs::copy_cost(len)?)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::MLOAD | Opcode::MSTORE => {
				let offset = stack.peek(0)?;
				frame.gasometer.record_memory(offset, U256::from(32))?;
			}
			Opcode::MSTORE8 => {
				let offset = stack.peek(0)?;
				frame.gasometer.record_memory(offset, U256::one())?;
			}
			Opcode::EXP => {
				let power = stack.peek(1)?;
				frame.gasometer.record_cost(costs::exp_cost(power))?;
			}
			Opcode::SSTORE => {
				let key = stack.peek_h256(0)?;
				let value = stack.peek_h256(1)?;
				let current = self.state.storage(context.address, key);
				let (cost, refund) = costs::sstore_cost(current.is_zero(), value.is_zero());
				frame.gasometer.record_cost(cost)?;
				if refund > 0 {
					self.state.add_refund(refund);
				}
			}
			Opcode::LOG0 | Opcode::LOG1 | Opcode::LOG2 | Opcode::LOG3 | Opcode::LOG4 => {
				let offset = stack.peek(0)?;
				let len = stack.peek(1)?;
				frame.gasometer.record_cost(costs::log_cost(len)?)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::RETURN => {
				let offset = stack.peek(0)?;
				let len = stack.peek(1)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::CREATE => {
				let offset = stack.peek(1)?;
				let len = stack.peek(2)?;
				frame.gasometer.record_memory(offset, len)?;
			}
			Opcode::CALL | Opcode::CALLCODE => {
				frame
					.gasometer
					.record_memory(stack.peek(3)?, stack.peek(4)?)?;
				frame
					.gasometer
					.record_memory(stack.peek(5)?, stack.peek(6)?)?;
			}
			Opcode::DELEGATECALL => {
				frame
					.gasometer
					.record_memory(stack.peek(2)?, stack.peek(3)?)?;
				frame
					.gasometer
					.record_memory(stack.peek(4)?, stack.peek(5)?)?;
			}
			_ => (),
		}
		Ok(())
	}
}

impl<'a, D: KVStore + Clone> Handler for Executor<'a, D> {
	fn balance(&mut self, address: H160) -> U256 {
		self.state.balance(address)
	}

	fn code_size(&mut self, address: H160) -> U256 {
		U256::from(self.state.code(address).len())
	}

	fn code(&mut self, address: H160) -> Vec<u8> {
		self.state.code(address).as_ref().clone()
	}

	fn storage(&mut self, address: H160, index: H256) -> H256 {
		self.state.storage(address, index)
	}

	fn exists(&mut self, address: H160) -> bool {
		self.state.exists(address)
	}

	fn gas_left(&self) -> U256 {
		U256::from(self.frame().gasometer.gas())
	}

	fn gas_price(&self) -> U256 {
		self.tx.gas_price
	}

	fn origin(&self) -> H160 {
		self.tx.origin
	}

	fn block_hash(&self, number: U256) -> H256 {
		let current = U256::from(self.block.number);
		if number >= current || current - number > U256::from(256) {
			return H256::zero();
		}
		let index = (current - number - U256::one()).as_usize();
		self.block.prev_hashes.get(index).copied().unwrap_or_default()
	}

	fn block_number(&self) -> U256 {
		U256::from(self.block.number)
	}

	fn block_coinbase(&self) -> H160 {
		self.block.coinbase
	}

	fn block_timestamp(&self) -> U256 {
		U256::from(self.block.timestamp)
	}

	fn block_difficulty(&self) -> U256 {
		self.block.difficulty
	}

	fn block_gas_limit(&self) -> U256 {
		U256::from(self.block.gas_limit)
	}

	fn set_storage(&mut self, address: H160, index: H256, value: H256) -> Result<(), ExitError> {
		self.state.set_storage(address, index, value);
		Ok(())
	}

	fn log(&mut self, address: H160, topics: Vec<H256>, data: Vec<u8>) -> Result<(), ExitError> {
		self.state.add_log(Log {
			address,
			topics,
			data,
		});
		Ok(())
	}

	fn mark_delete(&mut self, address: H160, target: H160) -> Result<(), ExitError> {
		let balance = self.state.balance(address);
		self.state.transfer_value(address, target, balance);
		self.state.add_suicide(address);
		Ok(())
	}

	fn create(
		&mut self,
		caller: H160,
		_scheme: CreateScheme,
		value: U256,
		init_code: Vec<u8>,
	) -> Result<(ExitReason, Option<H160>, Vec<u8>), ExitError> {
		let depth = self.frame().depth;
		if self.state.balance(caller) < value {
			return Ok((ExitError::OutOfFund.into(), None, Vec::new()));
		}
		if depth + 1 > self.config.call_depth_limit {
			return Ok((ExitError::CallTooDeep.into(), None, Vec::new()));
		}

		// All remaining gas is forwarded; whatever the creation leaves
		// over comes back as a stipend.
		let gas = self.frame().gasometer.gas();
		self.frame_mut().gasometer.record_cost(gas)?;
		let (result, address) = self.create_contract(caller, value, gas, init_code, depth + 1);
		match result {
			MessageResult::Success { gas_remaining, .. } => {
				self.frame_mut().gasometer.record_stipend(gas_remaining)?;
				Ok((ExitSucceed::Returned.into(), address, Vec::new()))
			}
			MessageResult::Failure { .. } => {
				Ok((ExitError::Other("creation failed").into(), None, Vec::new()))
			}
		}
	}

	fn call(
		&mut self,
		code_address: H160,
		transfer: Option<Transfer>,
		input: Vec<u8>,
		target_gas: U256,
		scheme: CallScheme,
		context: Context,
	) -> Result<(ExitReason, Vec<u8>), ExitError> {
		if scheme == CallScheme::DelegateCall && !self.config.has_delegatecall {
			return Err(ExitError::NotSupported);
		}

		let value = transfer.as_ref().map(|t| t.value).unwrap_or_default();
		let has_value = !value.is_zero();
		let new_account = scheme == CallScheme::Call && !self.state.exists(context.address);
		let extra = costs::call_extra_cost(has_value, new_account);

		// The caller must afford both the forwarded gas and the
		// surcharges; coming up short is a frame-level out-of-gas.
		let total = target_gas
			.checked_add(U256::from(extra))
			.ok_or(ExitError::OutOfGas)?;
		if U256::from(self.frame().gasometer.gas()) < total {
			return Err(ExitError::OutOfGas);
		}
		let requested = target_gas.as_u64();
		let stipend = if has_value {
			consts::G_CALL_STIPEND
		} else {
			0
		};
		let submsg_gas = requested + stipend;
		let depth = self.frame().depth;

		let sender_funded = match &transfer {
			Some(transfer) => self.state.balance(transfer.source) >= transfer.value,
			None => true,
		};
		if !sender_funded || depth + 1 > self.config.call_depth_limit {
			// Charge the surcharges but not the gas the sub-call never
			// received.
			self.frame_mut().gasometer.record_cost(total.as_u64())?;
			self.frame_mut().gasometer.record_stipend(submsg_gas)?;
			let reason = if sender_funded {
				ExitError::CallTooDeep
			} else {
				ExitError::OutOfFund
			};
			return Ok((reason.into(), Vec::new()));
		}

		self.frame_mut().gasometer.record_cost(total.as_u64())?;

		let msg = Message {
			sender: transfer
				.as_ref()
				.map(|t| t.source)
				.unwrap_or(context.caller),
			to: context.address,
			code_address,
			value,
			apparent_value: context.apparent_value,
			gas: submsg_gas,
			data: input,
			depth: depth + 1,
			transfers_value: transfer.is_some(),
		};
		match self.apply_msg(msg) {
			MessageResult::Success {
				gas_remaining,
				output,
			} => {
				self.frame_mut().gasometer.record_stipend(gas_remaining)?;
				Ok((ExitSucceed::Returned.into(), output))
			}
			MessageResult::Failure { .. } => {
				Ok((ExitError::Other("sub-call failed").into(), Vec::new()))
			}
		}
	}

	fn pre_validate(
		&mut self,
		context: &Context,
		machine: &Machine,
		position: usize,
	) -> Result<(), ExitError> {
		let frame = self
			.frames
			.last_mut()
			.expect("pre_validate inside a frame; qed");
		if let Some(chunk) = frame.chunks.get(position) {
			let depth = machine.stack().len();
			if depth < chunk.required_stack {
				return Err(ExitError::StackUnderflow);
			}
			if depth > chunk.max_stack {
				return Err(ExitError::StackOverflow);
			}
			frame.gasometer.record_cost(chunk.gas)?;
		}
		self.record_dynamic_cost(context, machine, position)
	}
}
