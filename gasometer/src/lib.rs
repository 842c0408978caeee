//! Gas accounting for embervm.
//!
//! Static per-opcode costs are charged per chunk (straight-line code
//! sequences found by [`ChunkMap::analyze`]), dynamic costs per opcode.

#![forbid(unsafe_code)]

mod chunks;
pub mod consts;
pub mod costs;
mod table;

pub use crate::chunks::{Chunk, ChunkMap};
pub use crate::table::{OpInfo, TABLE};

use ember_core::ExitError;
use primitive_types::U256;

/// Fork-dependent interpreter configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// Whether `DELEGATECALL` is active.
	pub has_delegatecall: bool,
	/// Stack limit per frame.
	pub stack_limit: usize,
	/// Memory limit per frame, in bytes.
	pub memory_limit: usize,
	/// Call/create nesting limit.
	pub call_depth_limit: usize,
}

impl Config {
	/// Frontier rules.
	pub const fn frontier() -> Config {
		Config {
			has_delegatecall: false,
			stack_limit: consts::STACK_LIMIT,
			memory_limit: usize::MAX,
			call_depth_limit: consts::CALL_DEPTH_LIMIT,
		}
	}

	/// Homestead rules.
	pub const fn homestead() -> Config {
		Config {
			has_delegatecall: true,
			stack_limit: consts::STACK_LIMIT,
			memory_limit: usize::MAX,
			call_depth_limit: consts::CALL_DEPTH_LIMIT,
		}
	}
}

#[derive(Clone, Debug)]
struct Inner {
	used_gas: u64,
	memory_words: u64,
}

/// Gas counter for one frame. Once a charge fails the gasometer stays
/// poisoned and every later query reports zero gas left.
#[derive(Clone, Debug)]
pub struct Gasometer {
	gas_limit: u64,
	inner: Result<Inner, ExitError>,
}

impl Gasometer {
	/// Create a new gasometer with the given gas limit.
	pub fn new(gas_limit: u64) -> Self {
		Self {
			gas_limit,
			inner: Ok(Inner {
				used_gas: 0,
				memory_words: 0,
			}),
		}
	}

	fn inner_mut(&mut self) -> Result<&mut Inner, ExitError> {
		self.inner.as_mut().map_err(|e| *e)
	}

	/// Remaining gas.
	pub fn gas(&self) -> u64 {
		match &self.inner {
			Ok(inner) => self.gas_limit - inner.used_gas,
			Err(_) => 0,
		}
	}

	/// Total used gas. Simply the gas limit when the gasometer is poisoned.
	pub fn total_used_gas(&self) -> u64 {
		match &self.inner {
			Ok(inner) => inner.used_gas,
			Err(_) => self.gas_limit,
		}
	}

	/// Record an explicit cost. On failure the all of the remaining gas is
	/// consumed.
	pub fn record_cost(&mut self, cost: u64) -> Result<(), ExitError> {
		let gas_limit = self.gas_limit;
		let inner = self.inner_mut()?;

		let all_gas_used = inner
			.used_gas
			.checked_add(cost)
			.map(|used| used > gas_limit)
			.unwrap_or(true);
		if all_gas_used {
			self.inner = Err(ExitError::OutOfGas);
			return Err(ExitError::OutOfGas);
		}

		inner.used_gas += cost;
		Ok(())
	}

	/// Return gas to the frame, e.g. the unspent part of a finished
	/// sub-call. Never returns more than was recorded.
	pub fn record_stipend(&mut self, stipend: u64) -> Result<(), ExitError> {
		let inner = self.inner_mut()?;
		inner.used_gas = inner.used_gas.saturating_sub(stipend);
		Ok(())
	}

	/// Record the fee for growing memory to cover `offset..offset + len`.
	/// The quadratic total fee is charged against the high-water mark, so
	/// shrinking accesses cost nothing.
	pub fn record_memory(&mut self, offset: U256, len: U256) -> Result<(), ExitError> {
		if len.is_zero() {
			return Ok(());
		}

		let end = match offset.checked_add(len) {
			Some(end) => end,
			None => {
				self.inner = Err(ExitError::OutOfGas);
				return Err(ExitError::OutOfGas);
			}
		};
		// Anything beyond 2^32 bytes can never be paid for.
		if end > U256::from(u32::MAX) {
			self.inner = Err(ExitError::OutOfGas);
			return Err(ExitError::OutOfGas);
		}

		let new_words = (end.as_u64() + 31) / 32;
		let old_words = match &self.inner {
			Ok(inner) => inner.memory_words,
			Err(e) => return Err(*e),
		};
		if new_words <= old_words {
			return Ok(());
		}

		let fee = costs::memory_fee(new_words) - costs::memory_fee(old_words);
		self.record_cost(fee)?;
		if let Ok(inner) = self.inner.as_mut() {
			inner.memory_words = new_words;
		}
		Ok(())
	}
}
