//! Built-in contracts at addresses 1 through 7.
//!
//! Each returns its gas cost and output; `None` means the call fails and
//! consumes all gas, either because the cost exceeds the gas given or
//! because a curve point failed to parse. A bad `ecrecover` signature is
//! not a failure: the call succeeds with empty output.

use bn::{AffineG1, Fq, Fr, Group, G1};
use ember_gasometer::consts::*;
use ember_trie::keccak;
use num_bigint::BigUint;
use primitive_types::{H160, H256, U256};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Precompile index of an address, if it is one.
pub fn index(address: H160) -> Option<u64> {
	if address.as_bytes()[..19].iter().any(|byte| *byte != 0) {
		return None;
	}
	match address.as_bytes()[19] {
		n @ 1..=7 => Some(n as u64),
		_ => None,
	}
}

/// Run precompile `index` over `input` with `gas` available.
pub fn execute(index: u64, input: &[u8], gas: u64) -> Option<(u64, Vec<u8>)> {
	let (cost, output) = match index {
		1 => (G_ECRECOVER, None),
		2 => (word_gas(input.len(), G_SHA256_BASE, G_SHA256_WORD)?, None),
		3 => (
			word_gas(input.len(), G_RIPEMD160_BASE, G_RIPEMD160_WORD)?,
			None,
		),
		4 => (word_gas(input.len(), G_IDENTITY_BASE, G_IDENTITY_WORD)?, None),
		5 => {
			let (cost, output) = modexp(input, gas)?;
			(cost, Some(output))
		}
		6 => (G_BN_ADD, None),
		7 => (G_BN_MUL, None),
		_ => return None,
	};
	if cost > gas {
		return None;
	}
	let output = match output {
		Some(output) => output,
		None => match index {
			1 => ecrecover(input),
			2 => Sha256::digest(input).to_vec(),
			3 => {
				let mut out = vec![0u8; 12];
				out.extend_from_slice(&Ripemd160::digest(input));
				out
			}
			4 => input.to_vec(),
			6 => bn_add(input)?,
			7 => bn_mul(input)?,
			_ => return None,
		},
	};
	Some((cost, output))
}

fn word_gas(len: usize, base: u64, per_word: u64) -> Option<u64> {
	let words = (len as u64 + 31) / 32;
	base.checked_add(words.checked_mul(per_word)?)
}

/// Right-pad `input` with zeros to `len` bytes.
fn padded(input: &[u8], len: usize) -> Vec<u8> {
	let mut out = input.to_vec();
	out.resize(len.max(input.len()), 0);
	out
}

fn ecrecover(input: &[u8]) -> Vec<u8> {
	let input = padded(input, 128);

	// v is a 32-byte quantity that must be exactly 27 or 28.
	if input[32..63].iter().any(|byte| *byte != 0) {
		return Vec::new();
	}
	let v = input[63];
	if v != 27 && v != 28 {
		return Vec::new();
	}

	let message = match libsecp256k1::Message::parse_slice(&input[0..32]) {
		Ok(message) => message,
		Err(_) => return Vec::new(),
	};
	let signature = match libsecp256k1::Signature::parse_standard_slice(&input[64..128]) {
		Ok(signature) => signature,
		Err(_) => return Vec::new(),
	};
	let recovery_id = match libsecp256k1::RecoveryId::parse(v - 27) {
		Ok(recovery_id) => recovery_id,
		Err(_) => return Vec::new(),
	};

	match libsecp256k1::recover(&message, &signature, &recovery_id) {
		Ok(pubkey) => {
			let hash = keccak(&pubkey.serialize()[1..]);
			let mut out = vec![0u8; 12];
			out.extend_from_slice(&hash.as_bytes()[12..]);
			out
		}
		Err(_) => Vec::new(),
	}
}

fn mult_complexity(x: u128) -> u128 {
	if x <= 64 {
		x * x
	} else if x <= 1024 {
		x * x / 4 + 96 * x - 3072
	} else {
		x * x / 16 + 480 * x - 199_680
	}
}

/// Arbitrary-precision `base ** exponent % modulus`. Returns the gas cost
/// and the result left-padded to the modulus length. The cost comes from
/// the header and the first exponent word alone and is checked against
/// `gas` before any operand buffer is built, so an underfunded call does
/// no big-number work.
fn modexp(input: &[u8], gas: u64) -> Option<(u64, Vec<u8>)> {
	let header = padded(input, 96);
	let base_len = U256::from_big_endian(&header[0..32]);
	let exp_len = U256::from_big_endian(&header[32..64]);
	let mod_len = U256::from_big_endian(&header[64..96]);

	// Lengths anywhere near the cap are unpayable anyway.
	if base_len > U256::from(u32::MAX)
		|| exp_len > U256::from(u32::MAX)
		|| mod_len > U256::from(u32::MAX)
	{
		return None;
	}
	let base_len = base_len.as_usize();
	let exp_len = exp_len.as_usize();
	let mod_len = mod_len.as_usize();

	let body = if input.len() > 96 { &input[96..] } else { &[][..] };

	// Adjusted exponent length counts the significant bits of the first
	// 32 exponent bytes.
	let head_len = exp_len.min(32);
	let mut head = [0u8; 32];
	for (i, slot) in head[..head_len].iter_mut().enumerate() {
		*slot = body.get(base_len + i).copied().unwrap_or(0);
	}
	let head_bits = BigUint::from_bytes_be(&head[..head_len]).bits();
	let adjusted = if exp_len <= 32 {
		head_bits.saturating_sub(1)
	} else {
		8 * (exp_len as u64 - 32) + head_bits.saturating_sub(1)
	};
	let cost = mult_complexity(base_len.max(mod_len) as u128)
		.saturating_mul(adjusted.max(1) as u128)
		/ 20;
	let cost = u64::try_from(cost).ok()?;
	if cost > gas {
		return None;
	}

	if mod_len == 0 {
		return Some((cost, Vec::new()));
	}
	let body = padded(body, base_len + exp_len + mod_len);
	let base = &body[0..base_len];
	let exponent = &body[base_len..base_len + exp_len];
	let modulus = &body[base_len + exp_len..base_len + exp_len + mod_len];
	let modulus_int = BigUint::from_bytes_be(modulus);
	let result = if modulus_int == BigUint::from(0u32) {
		Vec::new()
	} else {
		BigUint::from_bytes_be(base)
			.modpow(&BigUint::from_bytes_be(exponent), &modulus_int)
			.to_bytes_be()
	};

	let mut out = vec![0u8; mod_len - result.len().min(mod_len)];
	out.extend_from_slice(&result[result.len().saturating_sub(mod_len)..]);
	Some((cost, out))
}

fn read_g1_point(input: &[u8], offset: usize) -> Option<G1> {
	let x = Fq::from_slice(&input[offset..offset + 32]).ok()?;
	let y = Fq::from_slice(&input[offset + 32..offset + 64]).ok()?;
	if x == Fq::zero() && y == Fq::zero() {
		Some(G1::zero())
	} else {
		Some(AffineG1::new(x, y).ok()?.into())
	}
}

fn write_g1_point(point: G1) -> Vec<u8> {
	let mut out = vec![0u8; 64];
	if let Some(affine) = AffineG1::from_jacobian(point) {
		// Writing a field element into 32 bytes cannot fail.
		let _ = affine.x().to_big_endian(&mut out[0..32]);
		let _ = affine.y().to_big_endian(&mut out[32..64]);
	}
	out
}

fn bn_add(input: &[u8]) -> Option<Vec<u8>> {
	let input = padded(input, 128);
	let p1 = read_g1_point(&input, 0)?;
	let p2 = read_g1_point(&input, 64)?;
	Some(write_g1_point(p1 + p2))
}

fn bn_mul(input: &[u8]) -> Option<Vec<u8>> {
	let input = padded(input, 96);
	let point = read_g1_point(&input, 0)?;
	let scalar = Fr::from_slice(&input[64..96]).ok()?;
	Some(write_g1_point(point * scalar))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn precompile_address(n: u8) -> H160 {
		let mut bytes = [0u8; 20];
		bytes[19] = n;
		H160(bytes)
	}

	#[test]
	fn address_dispatch() {
		assert_eq!(index(precompile_address(1)), Some(1));
		assert_eq!(index(precompile_address(7)), Some(7));
		assert_eq!(index(precompile_address(8)), None);
		assert_eq!(index(precompile_address(0)), None);
		assert_eq!(index(H160::repeat_byte(1)), None);
	}

	#[test]
	fn sha256_of_empty_input() {
		let (cost, output) = execute(2, b"", 1_000_000).unwrap();
		assert_eq!(cost, 60);
		assert_eq!(
			hex::encode(output),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
	}

	#[test]
	fn ripemd160_of_empty_input() {
		let (cost, output) = execute(3, b"", 1_000_000).unwrap();
		assert_eq!(cost, 600);
		assert_eq!(
			hex::encode(output),
			"0000000000000000000000009c1185a5c5e9fc54612808977ee8f548b2258d31"
		);
	}

	#[test]
	fn identity_copies_and_charges_per_word() {
		let data = vec![7u8; 33];
		let (cost, output) = execute(4, &data, 1_000_000).unwrap();
		assert_eq!(cost, 15 + 2 * 3);
		assert_eq!(output, data);
	}

	#[test]
	fn insufficient_gas_fails() {
		assert_eq!(execute(2, b"", 59), None);
		assert_eq!(execute(1, b"", 2999), None);
	}

	#[test]
	fn ecrecover_garbage_is_success_with_empty_output() {
		let input = [0xffu8; 128];
		let (cost, output) = execute(1, &input, 1_000_000).unwrap();
		assert_eq!(cost, 3000);
		assert!(output.is_empty());
	}

	#[test]
	fn ecrecover_roundtrip() {
		let secret = libsecp256k1::SecretKey::parse(&[0x42u8; 32]).unwrap();
		let pubkey = libsecp256k1::PublicKey::from_secret_key(&secret);
		let expected = keccak(&pubkey.serialize()[1..]).as_bytes()[12..].to_vec();

		let digest = keccak(b"some message");
		let message = libsecp256k1::Message::parse_slice(digest.as_bytes()).unwrap();
		let (signature, recovery_id) = libsecp256k1::sign(&message, &secret);

		let mut input = Vec::with_capacity(128);
		input.extend_from_slice(digest.as_bytes());
		input.extend_from_slice(&[0u8; 31]);
		input.push(27 + recovery_id.serialize());
		input.extend_from_slice(&signature.serialize());

		let (_, output) = execute(1, &input, 1_000_000).unwrap();
		assert_eq!(&output[..12], &[0u8; 12]);
		assert_eq!(&output[12..], &expected[..]);
	}

	#[test]
	fn modexp_small_numbers() {
		// 3 ** 2 % 5 == 4
		let mut input = vec![0u8; 96];
		input[31] = 1;
		input[63] = 1;
		input[95] = 1;
		input.extend_from_slice(&[3, 2, 5]);
		let (_, output) = execute(5, &input, 1_000_000).unwrap();
		assert_eq!(output, vec![4]);
	}

	#[test]
	fn modexp_rejects_underfunded_calls_up_front() {
		// 1024-byte operands of 0xff price at ~146M gas. The call must be
		// refused on the header-derived cost alone, not after the modpow.
		let mut input = vec![0u8; 96];
		input[30] = 4;
		input[62] = 4;
		input[94] = 4;
		input.extend_from_slice(&[0xff; 3072]);
		assert_eq!(execute(5, &input, 0), None);
		assert_eq!(execute(5, &input, 1_000_000), None);
	}

	#[test]
	fn modexp_zero_modulus_yields_zeros() {
		let mut input = vec![0u8; 96];
		input[31] = 1;
		input[63] = 1;
		input[95] = 4;
		input.extend_from_slice(&[3, 2, 0, 0, 0, 0]);
		let (_, output) = execute(5, &input, 1_000_000).unwrap();
		assert_eq!(output, vec![0, 0, 0, 0]);
	}

	#[test]
	fn bn_add_identity() {
		// Adding the point at infinity to itself stays at infinity.
		let (cost, output) = execute(6, &[0u8; 128], 1_000_000).unwrap();
		assert_eq!(cost, 500);
		assert_eq!(output, vec![0u8; 64]);
	}

	#[test]
	fn bn_mul_by_zero_scalar() {
		// Generator (1, 2) times zero is the point at infinity.
		let mut input = vec![0u8; 96];
		input[31] = 1;
		input[63] = 2;
		let (cost, output) = execute(7, &input, 1_000_000).unwrap();
		assert_eq!(cost, 40_000);
		assert_eq!(output, vec![0u8; 64]);
	}

	#[test]
	fn bn_point_off_curve_fails() {
		let mut input = vec![0u8; 128];
		input[31] = 1;
		input[63] = 3;
		assert_eq!(execute(6, &input, 1_000_000), None);
	}
}
