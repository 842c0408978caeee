//! Hex-prefix encoding of nibble paths.
//!
//! A path is a sequence of nibbles (values 0..16). The compact encoding
//! packs two nibbles per byte and stores two flag bits in the first
//! nibble: bit 1 marks a leaf path, bit 0 marks odd length.

use crate::TrieError;

const FLAG_LEAF: u8 = 0x02;
const FLAG_ODD: u8 = 0x01;

/// Expand bytes into nibbles, high nibble first.
pub fn bytes_to_nibbles(key: &[u8]) -> Vec<u8> {
	let mut nibbles = Vec::with_capacity(key.len() * 2);
	for byte in key {
		nibbles.push(byte >> 4);
		nibbles.push(byte & 0x0f);
	}
	nibbles
}

/// Pack an even-length nibble sequence back into bytes.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
	debug_assert!(nibbles.len() % 2 == 0);
	nibbles
		.chunks(2)
		.map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
		.collect()
}

/// Hex-prefix encode a nibble path.
pub fn hex_prefix_encode(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
	let mut flags = if is_leaf { FLAG_LEAF } else { 0 };
	let odd = nibbles.len() % 2 == 1;
	if odd {
		flags |= FLAG_ODD;
	}

	let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
	let mut iter = nibbles.iter();
	if odd {
		out.push((flags << 4) | iter.next().copied().unwrap_or(0));
	} else {
		out.push(flags << 4);
	}
	loop {
		let high = match iter.next() {
			Some(v) => *v,
			None => break,
		};
		let low = iter.next().copied().unwrap_or(0);
		out.push((high << 4) | low);
	}
	out
}

/// Decode a hex-prefix encoded path. Returns the nibbles and the leaf
/// flag.
pub fn hex_prefix_decode(data: &[u8]) -> Result<(Vec<u8>, bool), TrieError> {
	if data.is_empty() {
		return Err(TrieError::InvalidHexPrefix(0xff));
	}

	let flags = data[0] >> 4;
	if flags > (FLAG_LEAF | FLAG_ODD) {
		return Err(TrieError::InvalidHexPrefix(flags));
	}
	let is_leaf = flags & FLAG_LEAF != 0;
	let odd = flags & FLAG_ODD != 0;

	let mut nibbles = Vec::with_capacity(data.len() * 2);
	if odd {
		nibbles.push(data[0] & 0x0f);
	}
	for byte in &data[1..] {
		nibbles.push(byte >> 4);
		nibbles.push(byte & 0x0f);
	}
	Ok((nibbles, is_leaf))
}
