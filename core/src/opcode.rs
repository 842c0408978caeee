use core::fmt;

/// Opcode enum. One-to-one corresponding to an `u8` value.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Opcode(pub u8);

// Core opcodes.
impl Opcode {
	/// `STOP`
	pub const STOP: Opcode = Opcode(0x00);
	/// `ADD`
	pub const ADD: Opcode = Opcode(0x01);
	/// `MUL`
	pub const MUL: Opcode = Opcode(0x02);
	/// `SUB`
	pub const SUB: Opcode = Opcode(0x03);
	/// `DIV`
	pub const DIV: Opcode = Opcode(0x04);
	/// `SDIV`
	pub const SDIV: Opcode = Opcode(0x05);
	/// `MOD`
	pub const MOD: Opcode = Opcode(0x06);
	/// `SMOD`
	pub const SMOD: Opcode = Opcode(0x07);
	/// `ADDMOD`
	pub const ADDMOD: Opcode = Opcode(0x08);
	/// `MULMOD`
	pub const MULMOD: Opcode = Opcode(0x09);
	/// `EXP`
	pub const EXP: Opcode = Opcode(0x0a);
	/// `SIGNEXTEND`
	pub const SIGNEXTEND: Opcode = Opcode(0x0b);

	/// `LT`
	pub const LT: Opcode = Opcode(0x10);
	/// `GT`
	pub const GT: Opcode = Opcode(0x11);
	/// `SLT`
	pub const SLT: Opcode = Opcode(0x12);
	/// `SGT`
	pub const SGT: Opcode = Opcode(0x13);
	/// `EQ`
	pub const EQ: Opcode = Opcode(0x14);
	/// `ISZERO`
	pub const ISZERO: Opcode = Opcode(0x15);
	/// `AND`
	pub const AND: Opcode = Opcode(0x16);
	/// `OR`
	pub const OR: Opcode = Opcode(0x17);
	/// `XOR`
	pub const XOR: Opcode = Opcode(0x18);
	/// `NOT`
	pub const NOT: Opcode = Opcode(0x19);
	/// `BYTE`
	pub const BYTE: Opcode = Opcode(0x1a);

	/// `SHA3`
	pub const SHA3: Opcode = Opcode(0x20);

	/// `CALLDATALOAD`
	pub const CALLDATALOAD: Opcode = Opcode(0x35);
	/// `CALLDATASIZE`
	pub const CALLDATASIZE: Opcode = Opcode(0x36);
	/// `CALLDATACOPY`
	pub const CALLDATACOPY: Opcode = Opcode(0x37);
	/// `CODESIZE`
	pub const CODESIZE: Opcode = Opcode(0x38);
	/// `CODECOPY`
	pub const CODECOPY: Opcode = Opcode(0x39);

	/// `POP`
	pub const POP: Opcode = Opcode(0x50);
	/// `MLOAD`
	pub const MLOAD: Opcode = Opcode(0x51);
	/// `MSTORE`
	pub const MSTORE: Opcode = Opcode(0x52);
	/// `MSTORE8`
	pub const MSTORE8: Opcode = Opcode(0x53);
	/// `JUMP`
	pub const JUMP: Opcode = Opcode(0x56);
	/// `JUMPI`
	pub const JUMPI: Opcode = Opcode(0x57);
	/// `PC`
	pub const PC: Opcode = Opcode(0x58);
	/// `MSIZE`
	pub const MSIZE: Opcode = Opcode(0x59);
	/// `JUMPDEST`
	pub const JUMPDEST: Opcode = Opcode(0x5b);

	/// `PUSHn`
	pub const PUSH1: Opcode = Opcode(0x60);
	pub const PUSH2: Opcode = Opcode(0x61);
	pub const PUSH32: Opcode = Opcode(0x7f);

	/// `DUPn`
	pub const DUP1: Opcode = Opcode(0x80);
	pub const DUP16: Opcode = Opcode(0x8f);

	/// `SWAPn`
	pub const SWAP1: Opcode = Opcode(0x90);
	pub const SWAP16: Opcode = Opcode(0x9f);

	/// `RETURN`
	pub const RETURN: Opcode = Opcode(0xf3);

	/// `INVALID`
	pub const INVALID: Opcode = Opcode(0xfe);
}

// External opcodes. These are resolved by the embedding runtime.
impl Opcode {
	/// `ADDRESS`
	pub const ADDRESS: Opcode = Opcode(0x30);
	/// `BALANCE`
	pub const BALANCE: Opcode = Opcode(0x31);
	/// `ORIGIN`
	pub const ORIGIN: Opcode = Opcode(0x32);
	/// `CALLER`
	pub const CALLER: Opcode = Opcode(0x33);
	/// `CALLVALUE`
	pub const CALLVALUE: Opcode = Opcode(0x34);
	/// `GASPRICE`
	pub const GASPRICE: Opcode = Opcode(0x3a);
	/// `EXTCODESIZE`
	pub const EXTCODESIZE: Opcode = Opcode(0x3b);
	/// `EXTCODECOPY`
	pub const EXTCODECOPY: Opcode = Opcode(0x3c);

	/// `BLOCKHASH`
	pub const BLOCKHASH: Opcode = Opcode(0x40);
	/// `COINBASE`
	pub const COINBASE: Opcode = Opcode(0x41);
	/// `TIMESTAMP`
	pub const TIMESTAMP: Opcode = Opcode(0x42);
	/// `NUMBER`
	pub const NUMBER: Opcode = Opcode(0x43);
	/// `DIFFICULTY`
	pub const DIFFICULTY: Opcode = Opcode(0x44);
	/// `GASLIMIT`
	pub const GASLIMIT: Opcode = Opcode(0x45);

	/// `SLOAD`
	pub const SLOAD: Opcode = Opcode(0x54);
	/// `SSTORE`
	pub const SSTORE: Opcode = Opcode(0x55);
	/// `GAS`
	pub const GAS: Opcode = Opcode(0x5a);

	/// `LOGn`
	pub const LOG0: Opcode = Opcode(0xa0);
	pub const LOG1: Opcode = Opcode(0xa1);
	pub const LOG2: Opcode = Opcode(0xa2);
	pub const LOG3: Opcode = Opcode(0xa3);
	pub const LOG4: Opcode = Opcode(0xa4);

	/// `CREATE`
	pub const CREATE: Opcode = Opcode(0xf0);
	/// `CALL`
	pub const CALL: Opcode = Opcode(0xf1);
	/// `CALLCODE`
	pub const CALLCODE: Opcode = Opcode(0xf2);
	/// `DELEGATECALL`
	pub const DELEGATECALL: Opcode = Opcode(0xf4);

	/// `SUICIDE`
	pub const SUICIDE: Opcode = Opcode(0xff);
}

impl Opcode {
	/// Whether the opcode is a push opcode.
	pub fn is_push(&self) -> Option<u8> {
		let value = self.0;
		if (0x60..=0x7f).contains(&value) {
			Some(value - 0x60 + 1)
		} else {
			None
		}
	}

	#[inline]
	pub const fn as_u8(&self) -> u8 {
		self.0
	}

	#[inline]
	pub const fn as_usize(&self) -> usize {
		self.0 as usize
	}
}

impl fmt::Debug for Opcode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl fmt::Display for Opcode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let Some(n) = self.is_push() {
			return write!(f, "PUSH{}", n);
		}
		if (0x80..=0x8f).contains(&self.0) {
			return write!(f, "DUP{}", self.0 - 0x80 + 1);
		}
		if (0x90..=0x9f).contains(&self.0) {
			return write!(f, "SWAP{}", self.0 - 0x90 + 1);
		}
		if (0xa0..=0xa4).contains(&self.0) {
			return write!(f, "LOG{}", self.0 - 0xa0);
		}

		let name = match *self {
			Opcode::STOP => "STOP",
			Opcode::ADD => "ADD",
			Opcode::MUL => "MUL",
			Opcode::SUB => "SUB",
			Opcode::DIV => "DIV",
			Opcode::SDIV => "SDIV",
			Opcode::MOD => "MOD",
			Opcode::SMOD => "SMOD",
			Opcode::ADDMOD => "ADDMOD",
			Opcode::MULMOD => "MULMOD",
			Opcode::EXP => "EXP",
			Opcode::SIGNEXTEND => "SIGNEXTEND",
			Opcode::LT => "LT",
			Opcode::GT => "GT",
			Opcode::SLT => "SLT",
			Opcode::SGT => "SGT",
			Opcode::EQ => "EQ",
			Opcode::ISZERO => "ISZERO",
			Opcode::AND => "AND",
			Opcode::OR => "OR",
			Opcode::XOR => "XOR",
			Opcode::NOT => "NOT",
			Opcode::BYTE => "BYTE",
			Opcode::SHA3 => "SHA3",
			Opcode::ADDRESS => "ADDRESS",
			Opcode::BALANCE => "BALANCE",
			Opcode::ORIGIN => "ORIGIN",
			Opcode::CALLER => "CALLER",
			Opcode::CALLVALUE => "CALLVALUE",
			Opcode::CALLDATALOAD => "CALLDATALOAD",
			Opcode::CALLDATASIZE => "CALLDATASIZE",
			Opcode::CALLDATACOPY => "CALLDATACOPY",
			Opcode::CODESIZE => "CODESIZE",
			Opcode::CODECOPY => "CODECOPY",
			Opcode::GASPRICE => "GASPRICE",
			Opcode::EXTCODESIZE => "EXTCODESIZE",
			Opcode::EXTCODECOPY => "EXTCODECOPY",
			Opcode::BLOCKHASH => "BLOCKHASH",
			Opcode::COINBASE => "COINBASE",
			Opcode::TIMESTAMP => "TIMESTAMP",
			Opcode::NUMBER => "NUMBER",
			Opcode::DIFFICULTY => "DIFFICULTY",
			Opcode::GASLIMIT => "GASLIMIT",
			Opcode::POP => "POP",
			Opcode::MLOAD => "MLOAD",
			Opcode::MSTORE => "MSTORE",
			Opcode::MSTORE8 => "MSTORE8",
			Opcode::SLOAD => "SLOAD",
			Opcode::SSTORE => "SSTORE",
			Opcode::JUMP => "JUMP",
			Opcode::JUMPI => "JUMPI",
			Opcode::PC => "PC",
			Opcode::MSIZE => "MSIZE",
			Opcode::GAS => "GAS",
			Opcode::JUMPDEST => "JUMPDEST",
			Opcode::CREATE => "CREATE",
			Opcode::CALL => "CALL",
			Opcode::CALLCODE => "CALLCODE",
			Opcode::RETURN => "RETURN",
			Opcode::DELEGATECALL => "DELEGATECALL",
			Opcode::INVALID => "INVALID",
			Opcode::SUICIDE => "SUICIDE",
			_ => "UNKNOWN",
		};
		write!(f, "{}", name)
	}
}
