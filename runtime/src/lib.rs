//! Runtime layer for embervm.
//!
//! Wraps a [`Machine`] together with its execution [`Context`] and
//! resolves the environment opcodes the core machine traps on, going
//! through the embedder's [`Handler`] implementation.

#![forbid(unsafe_code)]

mod context;
mod eval;
mod handler;

pub use crate::context::{CallScheme, Context, CreateScheme, Transfer};
pub use crate::handler::Handler;
pub use ember_core::*;

use std::rc::Rc;

/// EVM runtime: a machine plus its execution context.
pub struct Runtime {
	machine: Machine,
	status: Result<(), ExitReason>,
	return_data_buffer: Vec<u8>,
	context: Context,
}

impl Runtime {
	/// Create a new runtime with given code and data.
	pub fn new(
		code: Rc<Vec<u8>>,
		data: Rc<Vec<u8>>,
		stack_limit: usize,
		memory_limit: usize,
		context: Context,
	) -> Self {
		Self {
			machine: Machine::new(code, data, stack_limit, memory_limit),
			status: Ok(()),
			return_data_buffer: Vec::new(),
			context,
		}
	}

	/// Get a reference to the machine.
	#[inline]
	pub fn machine(&self) -> &Machine {
		&self.machine
	}

	/// Get a reference to the execution context.
	#[inline]
	pub fn context(&self) -> &Context {
		&self.context
	}

	/// Step the runtime, executing one opcode.
	pub fn step<H: Handler>(&mut self, handler: &mut H) -> Result<(), ExitReason> {
		if let Err(reason) = self.status {
			return Err(reason);
		}

		// Charge gas and check stack bounds before the opcode runs.
		if let Ok(position) = self.machine.position() {
			if let Err(e) = handler.pre_validate(&self.context, &self.machine, position) {
				self.machine.exit(e.into());
				self.status = Err(e.into());
				return Err(e.into());
			}
		}

		match self.machine.step() {
			Ok(()) => Ok(()),
			Err(Capture::Exit(exit)) => {
				self.status = Err(exit);
				Err(exit)
			}
			Err(Capture::Trap(opcode)) => match eval::eval(self, opcode, handler) {
				eval::Control::Continue => Ok(()),
				eval::Control::Exit(exit) => {
					self.machine.exit(exit);
					self.status = Err(exit);
					Err(exit)
				}
			},
		}
	}

	/// Run the runtime to completion.
	pub fn run<H: Handler>(&mut self, handler: &mut H) -> ExitReason {
		loop {
			match self.step(handler) {
				Ok(()) => (),
				Err(reason) => return reason,
			}
		}
	}
}
