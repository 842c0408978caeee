use crate::utils::I256;
use core::convert::TryInto;
use core::ops::Rem;
use primitive_types::{U256, U512};

#[inline]
pub fn div(op1: U256, op2: U256) -> U256 {
	if op2 == U256::zero() {
		U256::zero()
	} else {
		op1 / op2
	}
}

#[inline]
pub fn sdiv(op1: U256, op2: U256) -> U256 {
	let op1: I256 = op1.into();
	let op2: I256 = op2.into();
	let ret = op1 / op2;
	ret.into()
}

#[inline]
pub fn rem(op1: U256, op2: U256) -> U256 {
	if op2 == U256::zero() {
		U256::zero()
	} else {
		op1.rem(op2)
	}
}

#[inline]
pub fn srem(op1: U256, op2: U256) -> U256 {
	if op2 == U256::zero() {
		U256::zero()
	} else {
		let op1: I256 = op1.into();
		let op2: I256 = op2.into();
		let ret = op1.rem(op2);
		ret.into()
	}
}

#[inline]
pub fn addmod(op1: U256, op2: U256, op3: U256) -> U256 {
	if op3 == U256::zero() {
		U256::zero()
	} else {
		let op1: U512 = op1.into();
		let op2: U512 = op2.into();
		let op3: U512 = op3.into();
		let v = (op1 + op2) % op3;
		v.try_into()
			.expect("op3 is less than U256::MAX, thus it never overflows; qed")
	}
}

#[inline]
pub fn mulmod(op1: U256, op2: U256, op3: U256) -> U256 {
	if op3 == U256::zero() {
		U256::zero()
	} else {
		let op1: U512 = op1.into();
		let op2: U512 = op2.into();
		let op3: U512 = op3.into();
		let v = (op1 * op2) % op3;
		v.try_into()
			.expect("op3 is less than U256::MAX, thus it never overflows; qed")
	}
}

#[inline]
pub fn exp(op1: U256, op2: U256) -> U256 {
	let mut op1 = op1;
	let mut op2 = op2;
	let mut r: U256 = 1.into();

	while op2 != 0.into() {
		if op2 & 1.into() != 0.into() {
			r = r.overflowing_mul(op1).0;
		}
		op2 >>= 1;
		op1 = op1.overflowing_mul(op1).0;
	}

	r
}

/// Extend the sign of a `t + 1` bytes two's complement number to the full
/// 256 bits, where `t = 8 * op1 + 7`.
#[inline]
pub fn signextend(op1: U256, op2: U256) -> U256 {
	if op1 < U256::from(32) {
		let bit_index = (8 * op1.low_u32() + 7) as usize;
		let bit = op2.bit(bit_index);
		let mask = (U256::one() << bit_index) - U256::one();
		if bit {
			op2 | !mask
		} else {
			op2 & mask
		}
	} else {
		op2
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn div_by_zero_is_zero() {
		assert_eq!(div(U256::from(7), U256::zero()), U256::zero());
		assert_eq!(rem(U256::from(7), U256::zero()), U256::zero());
		assert_eq!(sdiv(U256::from(7), U256::zero()), U256::zero());
		assert_eq!(srem(U256::from(7), U256::zero()), U256::zero());
	}

	#[test]
	fn sdiv_min_by_minus_one_wraps() {
		// -2^255 / -1 overflows back to -2^255.
		let min = U256::one() << 255;
		let minus_one = U256::MAX;
		assert_eq!(sdiv(min, minus_one), min);
	}

	#[test]
	fn addmod_mulmod_use_wide_intermediate() {
		let max = U256::MAX;
		// (max + max) % max == 0 requires a 512-bit intermediate.
		assert_eq!(addmod(max, max, max), U256::zero());
		assert_eq!(mulmod(max, max, max), U256::zero());
		assert_eq!(
			addmod(max, U256::one(), U256::from(10)),
			// max == 2^256 - 1, 2^256 % 10 == 6
			U256::from(6)
		);
		assert_eq!(addmod(U256::one(), U256::one(), U256::zero()), U256::zero());
	}

	#[test]
	fn exp_wraps() {
		assert_eq!(exp(U256::from(2), U256::from(10)), U256::from(1024));
		assert_eq!(exp(U256::from(2), U256::from(256)), U256::zero());
		assert_eq!(exp(U256::zero(), U256::zero()), U256::one());
	}

	#[test]
	fn signextend_from_byte() {
		assert_eq!(
			signextend(U256::zero(), U256::from(0xff)),
			U256::MAX
		);
		assert_eq!(
			signextend(U256::zero(), U256::from(0x7f)),
			U256::from(0x7f)
		);
		assert_eq!(
			signextend(U256::from(1), U256::from(0x40ffu64)),
			U256::from(0x40ffu64)
		);
		assert_eq!(
			signextend(U256::from(1), U256::from(0x1_40ffu64)),
			U256::from(0x40ffu64)
		);
	}
}
