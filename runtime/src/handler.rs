use crate::{CallScheme, Context, CreateScheme, Transfer};
use ember_core::{ExitError, ExitReason, Machine};
use primitive_types::{H160, H256, U256};

/// EVM context handler. The embedder implements this over its state layer;
/// reads take `&mut self` because the state is allowed to cache through.
#[auto_impl::auto_impl(&mut, Box)]
pub trait Handler {
	/// Get balance of address.
	fn balance(&mut self, address: H160) -> U256;
	/// Get code size of address.
	fn code_size(&mut self, address: H160) -> U256;
	/// Get code of address.
	fn code(&mut self, address: H160) -> Vec<u8>;
	/// Get storage value of address at index.
	fn storage(&mut self, address: H160, index: H256) -> H256;
	/// Check whether an address exists.
	fn exists(&mut self, address: H160) -> bool;

	/// Get the gas left value.
	fn gas_left(&self) -> U256;
	/// Get the gas price value.
	fn gas_price(&self) -> U256;
	/// Get execution origin.
	fn origin(&self) -> H160;
	/// Get environmental block hash.
	fn block_hash(&self, number: U256) -> H256;
	/// Get environmental block number.
	fn block_number(&self) -> U256;
	/// Get environmental coinbase.
	fn block_coinbase(&self) -> H160;
	/// Get environmental block timestamp.
	fn block_timestamp(&self) -> U256;
	/// Get environmental block difficulty.
	fn block_difficulty(&self) -> U256;
	/// Get environmental gas limit.
	fn block_gas_limit(&self) -> U256;

	/// Set storage value of address at index.
	fn set_storage(&mut self, address: H160, index: H256, value: H256) -> Result<(), ExitError>;
	/// Create a log owned by address with given topics and data.
	fn log(&mut self, address: H160, topics: Vec<H256>, data: Vec<u8>) -> Result<(), ExitError>;
	/// Mark an address to be deleted, with funds transferred to target.
	fn mark_delete(&mut self, address: H160, target: H160) -> Result<(), ExitError>;

	/// Invoke a create operation. The returned `Err` consumes the calling
	/// frame; `Ok` carries the sub-creation outcome and the new address on
	/// success.
	fn create(
		&mut self,
		caller: H160,
		scheme: CreateScheme,
		value: U256,
		init_code: Vec<u8>,
	) -> Result<(ExitReason, Option<H160>, Vec<u8>), ExitError>;

	/// Invoke a call operation. The returned `Err` consumes the calling
	/// frame; `Ok` carries the sub-call outcome and return data.
	#[allow(clippy::too_many_arguments)]
	fn call(
		&mut self,
		code_address: H160,
		transfer: Option<Transfer>,
		input: Vec<u8>,
		target_gas: U256,
		scheme: CallScheme,
		context: Context,
	) -> Result<(ExitReason, Vec<u8>), ExitError>;

	/// Pre-validation hook, invoked before the machine executes the opcode
	/// at `position`. This is where chunk gas, stack bounds and dynamic
	/// costs are charged.
	fn pre_validate(
		&mut self,
		context: &Context,
		machine: &Machine,
		position: usize,
	) -> Result<(), ExitError>;
}
