//! Dynamic, operand-dependent cost calculation.

use crate::consts::*;
use ember_core::ExitError;
use primitive_types::U256;

/// Per-word cost over a byte length, rounding the length up to 32-byte
/// words. Overflow means the charge cannot possibly be paid.
fn word_cost(len: U256, word_gas: u64) -> Result<u64, ExitError> {
	let words = len
		.checked_add(U256::from(31))
		.ok_or(ExitError::OutOfGas)?
		/ U256::from(32);
	let cost = words
		.checked_mul(U256::from(word_gas))
		.ok_or(ExitError::OutOfGas)?;
	if cost > U256::from(u64::MAX) {
		return Err(ExitError::OutOfGas);
	}
	Ok(cost.as_u64())
}

/// `SHA3` data cost.
pub fn sha3_cost(len: U256) -> Result<u64, ExitError> {
	word_cost(len, G_SHA3_WORD)
}

/// `CALLDATACOPY`/`CODECOPY`/`EXTCODECOPY` data cost.
pub fn copy_cost(len: U256) -> Result<u64, ExitError> {
	word_cost(len, G_COPY)
}

/// `EXP` exponent cost: per significant byte of the exponent.
pub fn exp_cost(power: U256) -> u64 {
	if power.is_zero() {
		0
	} else {
		let bytes = (power.bits() as u64 + 7) / 8;
		G_EXPONENT_BYTE * bytes
	}
}

/// `LOGn` data cost: per byte, not per word.
pub fn log_cost(len: U256) -> Result<u64, ExitError> {
	let cost = len
		.checked_mul(U256::from(G_LOG_BYTE))
		.ok_or(ExitError::OutOfGas)?;
	if cost > U256::from(u64::MAX) {
		return Err(ExitError::OutOfGas);
	}
	Ok(cost.as_u64())
}

/// `SSTORE` cost and refund, classed by the current and new values.
pub fn sstore_cost(current_is_zero: bool, new_is_zero: bool) -> (u64, u64) {
	match (current_is_zero, new_is_zero) {
		// Fresh slot written.
		(true, false) => (G_STORAGE_ADD, 0),
		// No-op write into an empty slot.
		(true, true) => (G_STORAGE_MOD, 0),
		// Existing slot overwritten.
		(false, false) => (G_STORAGE_MOD, 0),
		// Existing slot cleared.
		(false, true) => (G_STORAGE_KILL, G_STORAGE_REFUND),
	}
}

/// Extra gas charged to the caller for `CALL`-family opcodes, on top of the
/// forwarded gas.
pub fn call_extra_cost(has_value: bool, new_account: bool) -> u64 {
	let mut extra = 0;
	if new_account {
		extra += G_CALL_NEW_ACCOUNT;
	}
	if has_value {
		extra += G_CALL_VALUE_TRANSFER;
	}
	extra
}

/// Total memory fee for a word count.
pub fn memory_fee(words: u64) -> u64 {
	words * G_MEMORY + words * words / G_QUADRATIC_MEM_DENOM
}

/// Intrinsic gas of a transaction with the given payload.
pub fn transaction_cost(data: &[u8]) -> u64 {
	let zero_bytes = data.iter().filter(|b| **b == 0).count() as u64;
	let nonzero_bytes = data.len() as u64 - zero_bytes;
	G_TX_COST + zero_bytes * G_TX_DATA_ZERO + nonzero_bytes * G_TX_DATA_NONZERO
}
