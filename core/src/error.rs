/// Capture represents the result of execution. This value can be either
/// `Exit` -- the execution is finished, or `Trap` -- the machine hit an
/// opcode it cannot handle itself and the embedder must resolve it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capture<E, T> {
	/// The machine has exited.
	Exit(E),
	/// The machine hit an external opcode.
	Trap(T),
}

/// Exit reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitReason {
	/// Machine has succeeded.
	Succeed(ExitSucceed),
	/// Machine exited with an error, consuming the frame.
	Error(ExitError),
}

impl ExitReason {
	/// Whether the exit is succeeded.
	pub fn is_succeed(&self) -> bool {
		matches!(self, Self::Succeed(_))
	}

	/// Whether the exit is error.
	pub fn is_error(&self) -> bool {
		matches!(self, Self::Error(_))
	}
}

/// Exit succeed reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitSucceed {
	/// Machine encountered an explicit stop.
	Stopped,
	/// Machine encountered an explicit return.
	Returned,
	/// Machine encountered an explicit suicide.
	Suicided,
}

impl From<ExitSucceed> for ExitReason {
	fn from(s: ExitSucceed) -> Self {
		Self::Succeed(s)
	}
}

/// Exit error reason. Any of these consumes all gas of the current frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitError {
	/// Trying to pop from an empty stack.
	StackUnderflow,
	/// Trying to push into a stack over stack limit.
	StackOverflow,
	/// Jump destination is invalid.
	InvalidJump,
	/// An opcode accesses a memory region outside addressable range.
	InvalidRange,
	/// Encountered an undefined instruction.
	DesignatedInvalid,
	/// Call stack is too deep (runtime).
	CallTooDeep,
	/// The frame wants to transfer more value than the balance holds.
	OutOfFund,
	/// Execution runs out of gas (runtime).
	OutOfGas,
	/// The opcode is not active under the current fork rules.
	NotSupported,
	/// Other normal errors.
	Other(&'static str),
}

impl From<ExitError> for ExitReason {
	fn from(s: ExitError) -> Self {
		Self::Error(s)
	}
}
