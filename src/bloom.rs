use ember_trie::keccak;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// 2048-bit log bloom filter.
///
/// Each added input sets three bits, chosen from the low 11 bits of the
/// first three big-endian byte pairs of its keccak hash. The byte array is
/// the big-endian encoding of the filter as a 2048-bit integer, so bit `k`
/// lives in byte `255 - k / 8`.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
	fn default() -> Self {
		Bloom([0u8; 256])
	}
}

fn bits_of(input: &[u8]) -> [usize; 3] {
	let hash = keccak(input);
	let mut bits = [0usize; 3];
	for (slot, i) in [0usize, 2, 4].into_iter().enumerate() {
		bits[slot] = (((hash[i] as usize) << 8) | hash[i + 1] as usize) & 2047;
	}
	bits
}

impl Bloom {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|byte| *byte == 0)
	}

	/// Set the three filter bits for `input`.
	pub fn add(&mut self, input: &[u8]) {
		for bit in bits_of(input) {
			self.0[255 - bit / 8] |= 1 << (bit % 8);
		}
	}

	/// Whether all three filter bits for `input` are set. False positives
	/// are possible, false negatives are not.
	pub fn contains_input(&self, input: &[u8]) -> bool {
		bits_of(input)
			.into_iter()
			.all(|bit| self.0[255 - bit / 8] & (1 << (bit % 8)) != 0)
	}

	/// OR another filter into this one.
	pub fn accrue(&mut self, other: &Bloom) {
		for (byte, other_byte) in self.0.iter_mut().zip(other.0.iter()) {
			*byte |= other_byte;
		}
	}
}

impl std::fmt::Debug for Bloom {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Bloom(0x")?;
		for byte in &self.0 {
			write!(f, "{:02x}", byte)?;
		}
		write!(f, ")")
	}
}

impl Encodable for Bloom {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.encoder().encode_value(&self.0[..]);
	}
}

impl Decodable for Bloom {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		let data = rlp.data()?;
		if data.len() != 256 {
			return Err(DecoderError::Custom("bloom filter must be 256 bytes"));
		}
		let mut bloom = Bloom::default();
		bloom.0.copy_from_slice(data);
		Ok(bloom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn added_inputs_are_contained() {
		let mut bloom = Bloom::new();
		assert!(bloom.is_zero());
		bloom.add(b"hello");
		assert!(!bloom.is_zero());
		assert!(bloom.contains_input(b"hello"));
		assert!(!bloom.contains_input(b"goodbye"));
	}

	#[test]
	fn three_bits_per_input() {
		let mut bloom = Bloom::new();
		bloom.add(b"x");
		let set: usize = bloom
			.0
			.iter()
			.map(|byte| byte.count_ones() as usize)
			.sum();
		assert!(set == 3 || set == 2, "hash pairs may collide: {set}");
	}

	#[test]
	fn accrue_is_a_union() {
		let mut a = Bloom::new();
		a.add(b"one");
		let mut b = Bloom::new();
		b.add(b"two");
		a.accrue(&b);
		assert!(a.contains_input(b"one"));
		assert!(a.contains_input(b"two"));
	}

	#[test]
	fn rlp_roundtrip() {
		let mut bloom = Bloom::new();
		bloom.add(b"log data");
		let encoded = rlp::encode(&bloom);
		assert_eq!(rlp::decode::<Bloom>(&encoded), Ok(bloom));
	}
}
