use crate::consts::STACK_LIMIT;
use crate::table::TABLE;
use ember_core::Opcode;
use std::collections::BTreeMap;

/// One straight-line chunk of code. The whole static cost of the chunk is
/// charged when execution enters it, and the stack bounds are checked once
/// for every opcode within.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
	/// Summed base gas of every opcode in the chunk.
	pub gas: u64,
	/// Stack depth required on entry.
	pub required_stack: usize,
	/// Largest stack depth allowed on entry without overflowing inside.
	pub max_stack: usize,
	/// Position one past the last opcode of the chunk.
	pub end: usize,
}

/// Chunk boundaries for one code blob, keyed by start position.
///
/// A chunk ends after any opcode that can redirect or terminate control
/// flow (or observe the gas counter), and before every `JUMPDEST` and `PC`.
#[derive(Clone, Debug, Default)]
pub struct ChunkMap {
	chunks: BTreeMap<usize, Chunk>,
}

/// Whether the opcode always terminates the chunk it appears in.
fn is_chunk_end(opcode: Opcode) -> bool {
	matches!(
		opcode,
		Opcode::JUMP
			| Opcode::JUMPI
			| Opcode::GAS
			| Opcode::CALL
			| Opcode::CALLCODE
			| Opcode::DELEGATECALL
			| Opcode::CREATE
			| Opcode::SUICIDE
			| Opcode::RETURN
			| Opcode::STOP
	)
}

impl ChunkMap {
	/// Pre-analyze the given code.
	pub fn analyze(code: &[u8]) -> Self {
		let mut chunks = BTreeMap::new();

		let mut start = 0usize;
		let mut stack: i64 = 0;
		let mut min_stack: i64 = 0;
		let mut max_stack: i64 = 0;
		let mut gas: u64 = 0;

		let mut i = 0usize;
		while i < code.len() {
			let opcode = Opcode(code[i]);

			// JUMPDEST and PC start a fresh chunk, so a jump landing there
			// (or PC reading its own position) never pays for a partial one.
			if i > start && (opcode == Opcode::JUMPDEST || opcode == Opcode::PC) {
				chunks.insert(
					start,
					Chunk {
						gas,
						required_stack: min_stack as usize,
						max_stack: (STACK_LIMIT as i64 - max_stack) as usize,
						end: i,
					},
				);
				start = i;
				stack = 0;
				min_stack = 0;
				max_stack = 0;
				gas = 0;
			}

			let info = TABLE[opcode.as_usize()];
			let (ins, outs, base) = match info {
				Some(v) => (v.ins as i64, v.outs as i64, v.gas),
				// Undefined instructions consume the frame when reached;
				// they still end the chunk.
				None => (0, 0, 0),
			};

			if min_stack < ins - stack {
				min_stack = ins - stack;
			}
			stack += outs - ins;
			if max_stack < stack {
				max_stack = stack;
			}
			gas += base;

			if let Some(n) = opcode.is_push() {
				i += n as usize;
			}

			if info.is_none() || is_chunk_end(opcode) {
				chunks.insert(
					start,
					Chunk {
						gas,
						required_stack: min_stack as usize,
						max_stack: (STACK_LIMIT as i64 - max_stack) as usize,
						end: i + 1,
					},
				);
				start = i + 1;
				stack = 0;
				min_stack = 0;
				max_stack = 0;
				gas = 0;
			}

			i += 1;
		}

		if start < i {
			chunks.insert(
				start,
				Chunk {
					gas,
					required_stack: min_stack as usize,
					max_stack: (STACK_LIMIT as i64 - max_stack) as usize,
					end: i,
				},
			);
		}

		Self { chunks }
	}

	/// The chunk starting exactly at `position`, if any.
	#[inline]
	pub fn get(&self, position: usize) -> Option<&Chunk> {
		self.chunks.get(&position)
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::ChunkMap;

	#[test]
	fn straight_line_code_is_one_chunk() {
		// PUSH1 1, PUSH1 2, ADD, POP, STOP
		let code = [0x60, 0x01, 0x60, 0x02, 0x01, 0x50, 0x00];
		let map = ChunkMap::analyze(&code);
		assert_eq!(map.len(), 1);
		let chunk = map.get(0).unwrap();
		// 3 + 3 + 3 + 2 + 0
		assert_eq!(chunk.gas, 11);
		assert_eq!(chunk.required_stack, 0);
		assert_eq!(chunk.max_stack, 1022);
		assert_eq!(chunk.end, code.len());
	}

	#[test]
	fn jumpdest_starts_a_chunk() {
		// PUSH1 4, JUMP, STOP, JUMPDEST, STOP
		let code = [0x60, 0x04, 0x56, 0x00, 0x5b, 0x00];
		let map = ChunkMap::analyze(&code);
		// [0..=2], [3], [4..]
		assert_eq!(map.len(), 3);
		assert_eq!(map.get(0).unwrap().gas, 3 + 8);
		assert_eq!(map.get(3).unwrap().gas, 0);
		// JUMPDEST itself costs 1
		assert_eq!(map.get(4).unwrap().gas, 1);
		assert!(map.get(5).is_none());
	}

	#[test]
	fn required_stack_covers_interior_pops() {
		// DUP1, POP, POP: needs one item on entry, peaks at +1.
		let code = [0x80, 0x50, 0x50];
		let map = ChunkMap::analyze(&code);
		let chunk = map.get(0).unwrap();
		assert_eq!(chunk.required_stack, 1);
		assert_eq!(chunk.max_stack, 1023);
	}

	#[test]
	fn gas_opcode_ends_chunk() {
		// GAS, GAS -- the counter must be charged up to and including each
		// GAS before its value is observed.
		let code = [0x5a, 0x5a];
		let map = ChunkMap::analyze(&code);
		assert_eq!(map.len(), 2);
		assert_eq!(map.get(0).unwrap().gas, 2);
		assert_eq!(map.get(1).unwrap().gas, 2);
	}

	#[test]
	fn push_data_is_not_scanned() {
		// PUSH2 0x5b00, STOP -- the 0x5b byte is data, not a JUMPDEST.
		let code = [0x61, 0x5b, 0x00, 0x00];
		let map = ChunkMap::analyze(&code);
		assert_eq!(map.len(), 1);
		assert_eq!(map.get(0).unwrap().gas, 3);
	}
}
