//! Core layer for the embervm interpreter.
//!
//! The machine here is pure: it executes arithmetic, stack, memory and
//! control-flow opcodes on its own, and traps out to the embedder for
//! anything that touches state, gas or the environment.

#![forbid(unsafe_code)]

mod error;
mod eval;
mod memory;
mod opcode;
mod stack;
pub mod utils;
mod valids;

pub use crate::error::{Capture, ExitError, ExitReason, ExitSucceed};
pub use crate::memory::Memory;
pub use crate::opcode::Opcode;
pub use crate::stack::Stack;
pub use crate::valids::Valids;

use crate::eval::{eval, Control};
use core::ops::Range;
use primitive_types::U256;
use std::rc::Rc;

/// Core execution layer for EVM-style bytecode.
pub struct Machine {
	/// Program data.
	data: Rc<Vec<u8>>,
	/// Program code.
	code: Rc<Vec<u8>>,
	/// Program counter.
	position: Result<usize, ExitReason>,
	/// Return value.
	return_range: Range<U256>,
	/// Code validity maps.
	valids: Valids,
	/// Memory.
	memory: Memory,
	/// Stack.
	stack: Stack,
}

impl Machine {
	/// Create a new machine with given code and data.
	pub fn new(code: Rc<Vec<u8>>, data: Rc<Vec<u8>>, stack_limit: usize, memory_limit: usize) -> Self {
		let valids = Valids::new(&code[..]);

		Self {
			data,
			code,
			position: Ok(0),
			return_range: U256::zero()..U256::zero(),
			valids,
			memory: Memory::new(memory_limit),
			stack: Stack::new(stack_limit),
		}
	}

	/// Reference of machine stack.
	#[inline]
	pub fn stack(&self) -> &Stack {
		&self.stack
	}

	/// Mutable reference of machine stack.
	#[inline]
	pub fn stack_mut(&mut self) -> &mut Stack {
		&mut self.stack
	}

	/// Reference of machine memory.
	#[inline]
	pub fn memory(&self) -> &Memory {
		&self.memory
	}

	/// Mutable reference of machine memory.
	#[inline]
	pub fn memory_mut(&mut self) -> &mut Memory {
		&mut self.memory
	}

	/// Program code.
	#[inline]
	pub fn code(&self) -> &[u8] {
		&self.code
	}

	/// Program data.
	#[inline]
	pub fn data(&self) -> &[u8] {
		&self.data
	}

	/// Current program counter, or the exit reason if the machine has
	/// already exited.
	#[inline]
	pub fn position(&self) -> Result<usize, ExitReason> {
		self.position
	}

	/// Explicit exit of the machine. Further step will return the exit
	/// reason.
	pub fn exit(&mut self, reason: ExitReason) {
		self.position = Err(reason);
	}

	/// Inspect the machine's next opcode and current stack.
	pub fn inspect(&self) -> Option<(Opcode, &Stack)> {
		let position = match self.position {
			Ok(position) => position,
			Err(_) => return None,
		};
		self.code.get(position).map(|v| (Opcode(*v), &self.stack))
	}

	/// Copy and get the return value of the machine, if any.
	pub fn return_value(&self) -> Vec<u8> {
		if self.return_range.start > U256::from(usize::MAX) {
			let mut ret = Vec::new();
			ret.resize(
				(self.return_range.end - self.return_range.start).low_u64() as usize,
				0,
			);
			ret
		} else if self.return_range.end > U256::from(usize::MAX) {
			let mut ret = self.memory.get(
				self.return_range.start.as_usize(),
				usize::MAX - self.return_range.start.as_usize(),
			);
			while ret.len() < (self.return_range.end - self.return_range.start).low_u64() as usize {
				ret.push(0);
			}
			ret
		} else {
			self.memory.get(
				self.return_range.start.as_usize(),
				(self.return_range.end - self.return_range.start).as_usize(),
			)
		}
	}

	/// Loop stepping the machine, until it stops or traps out.
	pub fn run(&mut self) -> Capture<ExitReason, Opcode> {
		loop {
			match self.step() {
				Ok(()) => (),
				Err(res) => return res,
			}
		}
	}

	/// Step the machine, executing one opcode. It then returns.
	pub fn step(&mut self) -> Result<(), Capture<ExitReason, Opcode>> {
		let position = match self.position {
			Ok(position) => position,
			Err(e) => return Err(Capture::Exit(e)),
		};

		let opcode = match self.code.get(position) {
			Some(v) => Opcode(*v),
			None => {
				self.position = Err(ExitSucceed::Stopped.into());
				return Err(Capture::Exit(ExitSucceed::Stopped.into()));
			}
		};

		match eval(self, opcode, position) {
			Control::Continue(p) => {
				self.position = Ok(position + p);
				Ok(())
			}
			Control::Exit(e) => {
				self.position = Err(e);
				Err(Capture::Exit(e))
			}
			Control::Jump(p) => {
				if self.valids.is_valid(p) {
					self.position = Ok(p);
					Ok(())
				} else {
					self.position = Err(ExitError::InvalidJump.into());
					Err(Capture::Exit(ExitError::InvalidJump.into()))
				}
			}
			Control::Trap(opcode) => {
				self.position = Ok(position + 1);
				Err(Capture::Trap(opcode))
			}
		}
	}
}
