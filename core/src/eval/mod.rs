#[macro_use]
mod macros;
mod arithmetic;
mod bitwise;
mod misc;

use crate::{ExitError, ExitReason, ExitSucceed, Machine, Opcode};
use core::ops::{BitAnd, BitOr, BitXor};
use primitive_types::U256;

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Control {
	Continue(usize),
	Exit(ExitReason),
	Jump(usize),
	Trap(Opcode),
}

fn eval_external(_state: &mut Machine, opcode: Opcode, _position: usize) -> Control {
	Control::Trap(opcode)
}

static TABLE: [fn(state: &mut Machine, opcode: Opcode, position: usize) -> Control; 256] = {
	fn eval_invalid(_state: &mut Machine, _opcode: Opcode, _position: usize) -> Control {
		Control::Exit(ExitError::DesignatedInvalid.into())
	}

	let mut table = [eval_external as _; 256];

	macro_rules! table_elem {
		($operation:ident, $definition:expr) => {
			table_elem!($operation, _state, $definition)
		};
		($operation:ident, $state:ident, $definition:expr) => {
			table_elem!($operation, $state, _pc, $definition)
		};
		($operation:ident, $state:ident, $pc:ident, $definition:expr) => {
			#[allow(non_snake_case)]
			fn $operation($state: &mut Machine, _opcode: Opcode, $pc: usize) -> Control {
				$definition
			}
			table[Opcode::$operation.as_usize()] = $operation as _;
		};
	}

	table_elem!(STOP, Control::Exit(ExitSucceed::Stopped.into()));
	table_elem!(ADD, state, op2_u256_tuple!(state, overflowing_add));
	table_elem!(MUL, state, op2_u256_tuple!(state, overflowing_mul));
	table_elem!(SUB, state, op2_u256_tuple!(state, overflowing_sub));
	table_elem!(DIV, state, op2_u256_fn!(state, self::arithmetic::div));
	table_elem!(SDIV, state, op2_u256_fn!(state, self::arithmetic::sdiv));
	table_elem!(MOD, state, op2_u256_fn!(state, self::arithmetic::rem));
	table_elem!(SMOD, state, op2_u256_fn!(state, self::arithmetic::srem));
	table_elem!(ADDMOD, state, op3_u256_fn!(state, self::arithmetic::addmod));
	table_elem!(MULMOD, state, op3_u256_fn!(state, self::arithmetic::mulmod));
	table_elem!(EXP, state, op2_u256_fn!(state, self::arithmetic::exp));
	table_elem!(
		SIGNEXTEND,
		state,
		op2_u256_fn!(state, self::arithmetic::signextend)
	);
	table_elem!(LT, state, op2_u256_bool_ref!(state, lt));
	table_elem!(GT, state, op2_u256_bool_ref!(state, gt));
	table_elem!(SLT, state, op2_u256_fn!(state, self::bitwise::slt));
	table_elem!(SGT, state, op2_u256_fn!(state, self::bitwise::sgt));
	table_elem!(EQ, state, op2_u256_bool_ref!(state, eq));
	table_elem!(ISZERO, state, op1_u256_fn!(state, self::bitwise::iszero));
	table_elem!(AND, state, op2_u256!(state, bitand));
	table_elem!(OR, state, op2_u256!(state, bitor));
	table_elem!(XOR, state, op2_u256!(state, bitxor));
	table_elem!(NOT, state, op1_u256_fn!(state, self::bitwise::not));
	table_elem!(BYTE, state, op2_u256_fn!(state, self::bitwise::byte));
	table_elem!(CALLDATALOAD, state, self::misc::calldataload(state));
	table_elem!(CALLDATASIZE, state, self::misc::calldatasize(state));
	table_elem!(CALLDATACOPY, state, self::misc::calldatacopy(state));
	table_elem!(CODESIZE, state, self::misc::codesize(state));
	table_elem!(CODECOPY, state, self::misc::codecopy(state));
	table_elem!(POP, state, self::misc::pop(state));
	table_elem!(MLOAD, state, self::misc::mload(state));
	table_elem!(MSTORE, state, self::misc::mstore(state));
	table_elem!(MSTORE8, state, self::misc::mstore8(state));
	table_elem!(JUMP, state, self::misc::jump(state));
	table_elem!(JUMPI, state, self::misc::jumpi(state));
	table_elem!(PC, state, position, self::misc::pc(state, position));
	table_elem!(MSIZE, state, self::misc::msize(state));
	table_elem!(JUMPDEST, Control::Continue(1));
	table_elem!(RETURN, state, self::misc::ret(state));
	table_elem!(INVALID, Control::Exit(ExitError::DesignatedInvalid.into()));

	let mut index = 0x60;
	while index <= 0x7f {
		table[index] = eval_push as _;
		index += 1;
	}
	let mut index = 0x80;
	while index <= 0x8f {
		table[index] = eval_dup as _;
		index += 1;
	}
	let mut index = 0x90;
	while index <= 0x9f {
		table[index] = eval_swap as _;
		index += 1;
	}

	// Undefined instructions fail the same way as the designated invalid
	// opcode does, except the ones the embedding runtime resolves.
	let undefined: &[usize] = &[
		0x0c, 0x0d, 0x0e, 0x0f, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26,
		0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e, 0x2f, 0x3d, 0x3e, 0x3f, 0x46, 0x47, 0x48,
		0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f, 0x5c, 0x5d, 0x5e, 0x5f, 0xa5, 0xa6, 0xa7, 0xa8,
		0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7,
		0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf, 0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6,
		0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce, 0xcf, 0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd5,
		0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf, 0xe0, 0xe1, 0xe2, 0xe3, 0xe4,
		0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xeb, 0xec, 0xed, 0xee, 0xef, 0xf5, 0xf6, 0xf7, 0xf8,
		0xf9, 0xfa, 0xfb, 0xfc, 0xfd,
	];
	let mut index = 0;
	while index < undefined.len() {
		table[undefined[index]] = eval_invalid as _;
		index += 1;
	}

	table
};

fn eval_push(state: &mut Machine, opcode: Opcode, position: usize) -> Control {
	self::misc::push(state, (opcode.as_u8() - 0x60 + 1) as usize, position)
}

fn eval_dup(state: &mut Machine, opcode: Opcode, _position: usize) -> Control {
	self::misc::dup(state, (opcode.as_u8() - 0x80 + 1) as usize)
}

fn eval_swap(state: &mut Machine, opcode: Opcode, _position: usize) -> Control {
	self::misc::swap(state, (opcode.as_u8() - 0x90 + 1) as usize)
}

#[inline]
pub fn eval(state: &mut Machine, opcode: Opcode, position: usize) -> Control {
	TABLE[opcode.as_usize()](state, opcode, position)
}
