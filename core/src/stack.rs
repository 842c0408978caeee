use crate::ExitError;
use primitive_types::{H256, U256};

/// EVM stack.
#[derive(Clone, Debug)]
pub struct Stack {
	data: Vec<U256>,
	limit: usize,
}

impl Stack {
	/// Create a new stack with given limit.
	pub fn new(limit: usize) -> Self {
		Self {
			data: Vec::new(),
			limit,
		}
	}

	#[inline]
	pub fn limit(&self) -> usize {
		self.limit
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	#[inline]
	pub fn data(&self) -> &Vec<U256> {
		&self.data
	}

	/// Pop a value from the stack. If the stack is already empty, returns the
	/// `StackUnderflow` error.
	pub fn pop(&mut self) -> Result<U256, ExitError> {
		self.data.pop().ok_or(ExitError::StackUnderflow)
	}

	/// Pop a value from the stack, converted to `H256`.
	pub fn pop_h256(&mut self) -> Result<H256, ExitError> {
		self.pop().map(|it| {
			let mut res = H256([0; 32]);
			it.to_big_endian(&mut res.0);
			res
		})
	}

	/// Push a new value into the stack. If it exceeds the stack limit,
	/// returns `StackOverflow` error and leaves the stack unchanged.
	pub fn push(&mut self, value: U256) -> Result<(), ExitError> {
		if self.data.len() + 1 > self.limit {
			return Err(ExitError::StackOverflow);
		}
		self.data.push(value);
		Ok(())
	}

	/// Peek a value at given index for the stack, where the top of
	/// the stack is at index `0`. If the index is too large,
	/// `StackUnderflow` is returned.
	pub fn peek(&self, no_from_top: usize) -> Result<U256, ExitError> {
		if self.data.len() > no_from_top {
			Ok(self.data[self.data.len() - no_from_top - 1])
		} else {
			Err(ExitError::StackUnderflow)
		}
	}

	/// Peek a value at given index for the stack as `H256`.
	pub fn peek_h256(&self, no_from_top: usize) -> Result<H256, ExitError> {
		self.peek(no_from_top).map(|it| {
			let mut res = H256([0; 32]);
			it.to_big_endian(&mut res.0);
			res
		})
	}

	/// Set a value at given index for the stack, where the top of the
	/// stack is at index `0`. If the index is too large,
	/// `StackUnderflow` is returned.
	pub fn set(&mut self, no_from_top: usize, val: U256) -> Result<(), ExitError> {
		if self.data.len() > no_from_top {
			let len = self.data.len();
			self.data[len - no_from_top - 1] = val;
			Ok(())
		} else {
			Err(ExitError::StackUnderflow)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pop_pushed_value() {
		let mut stack = Stack::new(1024);
		stack.push(U256::from(0xde)).unwrap();
		assert_eq!(stack.pop(), Ok(U256::from(0xde)));
		assert_eq!(stack.pop(), Err(ExitError::StackUnderflow));
	}

	#[test]
	fn push_above_limit_fails() {
		let mut stack = Stack::new(1);
		stack.push(U256::one()).unwrap();
		assert_eq!(stack.push(U256::one()), Err(ExitError::StackOverflow));
		assert_eq!(stack.len(), 1);
	}

	#[test]
	fn peek_and_set() {
		let mut stack = Stack::new(1024);
		stack.push(U256::from(1)).unwrap();
		stack.push(U256::from(2)).unwrap();
		assert_eq!(stack.peek(0), Ok(U256::from(2)));
		assert_eq!(stack.peek(1), Ok(U256::from(1)));
		assert_eq!(stack.peek(2), Err(ExitError::StackUnderflow));
		stack.set(1, U256::from(5)).unwrap();
		assert_eq!(stack.peek(1), Ok(U256::from(5)));
	}
}
