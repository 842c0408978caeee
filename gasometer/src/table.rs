use ember_core::Opcode;

/// Static information about one opcode: stack items consumed and produced,
/// and the base gas charged regardless of operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpInfo {
	pub ins: u8,
	pub outs: u8,
	pub gas: u64,
}

const fn op(ins: u8, outs: u8, gas: u64) -> Option<OpInfo> {
	Some(OpInfo { ins, outs, gas })
}

/// Per-opcode static table. `None` marks an undefined instruction.
pub static TABLE: [Option<OpInfo>; 256] = {
	let mut table: [Option<OpInfo>; 256] = [None; 256];

	table[Opcode::STOP.as_usize()] = op(0, 0, 0);
	table[Opcode::ADD.as_usize()] = op(2, 1, 3);
	table[Opcode::MUL.as_usize()] = op(2, 1, 5);
	table[Opcode::SUB.as_usize()] = op(2, 1, 3);
	table[Opcode::DIV.as_usize()] = op(2, 1, 5);
	table[Opcode::SDIV.as_usize()] = op(2, 1, 5);
	table[Opcode::MOD.as_usize()] = op(2, 1, 5);
	table[Opcode::SMOD.as_usize()] = op(2, 1, 5);
	table[Opcode::ADDMOD.as_usize()] = op(3, 1, 8);
	table[Opcode::MULMOD.as_usize()] = op(3, 1, 8);
	table[Opcode::EXP.as_usize()] = op(2, 1, 10);
	table[Opcode::SIGNEXTEND.as_usize()] = op(2, 1, 5);

	table[Opcode::LT.as_usize()] = op(2, 1, 3);
	table[Opcode::GT.as_usize()] = op(2, 1, 3);
	table[Opcode::SLT.as_usize()] = op(2, 1, 3);
	table[Opcode::SGT.as_usize()] = op(2, 1, 3);
	table[Opcode::EQ.as_usize()] = op(2, 1, 3);
	table[Opcode::ISZERO.as_usize()] = op(1, 1, 3);
	table[Opcode::AND.as_usize()] = op(2, 1, 3);
	table[Opcode::OR.as_usize()] = op(2, 1, 3);
	table[Opcode::XOR.as_usize()] = op(2, 1, 3);
	table[Opcode::NOT.as_usize()] = op(1, 1, 3);
	table[Opcode::BYTE.as_usize()] = op(2, 1, 3);

	table[Opcode::SHA3.as_usize()] = op(2, 1, 30);

	table[Opcode::ADDRESS.as_usize()] = op(0, 1, 2);
	table[Opcode::BALANCE.as_usize()] = op(1, 1, 20);
	table[Opcode::ORIGIN.as_usize()] = op(0, 1, 2);
	table[Opcode::CALLER.as_usize()] = op(0, 1, 2);
	table[Opcode::CALLVALUE.as_usize()] = op(0, 1, 2);
	table[Opcode::CALLDATALOAD.as_usize()] = op(1, 1, 3);
	table[Opcode::CALLDATASIZE.as_usize()] = op(0, 1, 2);
	table[Opcode::CALLDATACOPY.as_usize()] = op(3, 0, 3);
	table[Opcode::CODESIZE.as_usize()] = op(0, 1, 2);
	table[Opcode::CODECOPY.as_usize()] = op(3, 0, 3);
	table[Opcode::GASPRICE.as_usize()] = op(0, 1, 2);
	table[Opcode::EXTCODESIZE.as_usize()] = op(1, 1, 20);
	table[Opcode::EXTCODECOPY.as_usize()] = op(4, 0, 20);

	table[Opcode::BLOCKHASH.as_usize()] = op(1, 1, 20);
	table[Opcode::COINBASE.as_usize()] = op(0, 1, 2);
	table[Opcode::TIMESTAMP.as_usize()] = op(0, 1, 2);
	table[Opcode::NUMBER.as_usize()] = op(0, 1, 2);
	table[Opcode::DIFFICULTY.as_usize()] = op(0, 1, 2);
	table[Opcode::GASLIMIT.as_usize()] = op(0, 1, 2);

	table[Opcode::POP.as_usize()] = op(1, 0, 2);
	table[Opcode::MLOAD.as_usize()] = op(1, 1, 3);
	table[Opcode::MSTORE.as_usize()] = op(2, 0, 3);
	table[Opcode::MSTORE8.as_usize()] = op(2, 0, 3);
	table[Opcode::SLOAD.as_usize()] = op(1, 1, 50);
	// SSTORE has no base cost; it is charged entirely from the
	// current/new value classes.
	table[Opcode::SSTORE.as_usize()] = op(2, 0, 0);
	table[Opcode::JUMP.as_usize()] = op(1, 0, 8);
	table[Opcode::JUMPI.as_usize()] = op(2, 0, 10);
	table[Opcode::PC.as_usize()] = op(0, 1, 2);
	table[Opcode::MSIZE.as_usize()] = op(0, 1, 2);
	table[Opcode::GAS.as_usize()] = op(0, 1, 2);
	table[Opcode::JUMPDEST.as_usize()] = op(0, 0, 1);

	let mut i = 0x60;
	while i <= 0x7f {
		table[i] = op(0, 1, 3);
		i += 1;
	}
	let mut n = 1u8;
	while n <= 16 {
		table[0x80 + (n as usize) - 1] = op(n, n + 1, 3);
		table[0x90 + (n as usize) - 1] = op(n + 1, n + 1, 3);
		n += 1;
	}
	let mut n = 0u8;
	while n <= 4 {
		table[0xa0 + n as usize] = op(n + 2, 0, 375 * (n as u64 + 1));
		n += 1;
	}

	table[Opcode::CREATE.as_usize()] = op(3, 1, 32000);
	table[Opcode::CALL.as_usize()] = op(7, 1, 40);
	table[Opcode::CALLCODE.as_usize()] = op(7, 1, 40);
	table[Opcode::RETURN.as_usize()] = op(2, 0, 0);
	table[Opcode::DELEGATECALL.as_usize()] = op(6, 1, 40);
	table[Opcode::SUICIDE.as_usize()] = op(1, 0, 0);

	table
};

#[cfg(test)]
mod tests {
	use super::{OpInfo, TABLE};
	use ember_core::Opcode;

	#[test]
	fn schedule_spot_checks() {
		assert_eq!(TABLE[Opcode::ADD.as_usize()], Some(OpInfo { ins: 2, outs: 1, gas: 3 }));
		assert_eq!(TABLE[Opcode::SLOAD.as_usize()], Some(OpInfo { ins: 1, outs: 1, gas: 50 }));
		assert_eq!(TABLE[Opcode::PUSH32.as_usize()], Some(OpInfo { ins: 0, outs: 1, gas: 3 }));
		assert_eq!(TABLE[Opcode::DUP16.as_usize()], Some(OpInfo { ins: 16, outs: 17, gas: 3 }));
		assert_eq!(TABLE[Opcode::SWAP1.as_usize()], Some(OpInfo { ins: 2, outs: 2, gas: 3 }));
		assert_eq!(TABLE[Opcode::LOG4.as_usize()], Some(OpInfo { ins: 6, outs: 0, gas: 1875 }));
		assert_eq!(TABLE[Opcode::CREATE.as_usize()], Some(OpInfo { ins: 3, outs: 1, gas: 32000 }));
		assert_eq!(TABLE[0x0c], None);
		assert_eq!(TABLE[0xfd], None);
	}
}
