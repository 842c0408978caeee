use super::Control;
use crate::{CallScheme, Context, CreateScheme, Handler, Runtime, Transfer};
use ember_core::{ExitError, ExitSucceed};
use primitive_types::{H256, U256};
use sha3::{Digest, Keccak256};

pub fn sha3(runtime: &mut Runtime) -> Control {
	pop_u256!(runtime, from, len);

	try_or_fail!(runtime.machine.memory_mut().resize_offset(from, len));
	let data = if len == U256::zero() {
		Vec::new()
	} else {
		let from = as_usize_or_fail!(from);
		let len = as_usize_or_fail!(len);

		runtime.machine.memory_mut().get(from, len)
	};

	let ret = Keccak256::digest(data.as_slice());
	push_h256!(runtime, H256::from_slice(ret.as_slice()));

	Control::Continue
}

pub fn address(runtime: &mut Runtime) -> Control {
	let ret = H256::from(runtime.context.address);
	push_h256!(runtime, ret);

	Control::Continue
}

pub fn balance<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, address);
	push_u256!(runtime, handler.balance(address.into()));

	Control::Continue
}

pub fn origin<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	let ret = H256::from(handler.origin());
	push_h256!(runtime, ret);

	Control::Continue
}

pub fn caller(runtime: &mut Runtime) -> Control {
	let ret = H256::from(runtime.context.caller);
	push_h256!(runtime, ret);

	Control::Continue
}

pub fn callvalue(runtime: &mut Runtime) -> Control {
	let mut ret = H256::default();
	runtime.context.apparent_value.to_big_endian(&mut ret[..]);
	push_h256!(runtime, ret);

	Control::Continue
}

pub fn gasprice<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	let mut ret = H256::default();
	handler.gas_price().to_big_endian(&mut ret[..]);
	push_h256!(runtime, ret);

	Control::Continue
}

pub fn extcodesize<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, address);
	push_u256!(runtime, handler.code_size(address.into()));

	Control::Continue
}

pub fn extcodecopy<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, address);
	pop_u256!(runtime, memory_offset, code_offset, len);

	try_or_fail!(runtime
		.machine
		.memory_mut()
		.resize_offset(memory_offset, len));
	let code = handler.code(address.into());
	match runtime
		.machine
		.memory_mut()
		.copy_large(memory_offset, code_offset, len, &code)
	{
		Ok(()) => (),
		Err(e) => return Control::Exit(e.into()),
	};

	Control::Continue
}

pub fn blockhash<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	pop_u256!(runtime, number);
	push_h256!(runtime, handler.block_hash(number));

	Control::Continue
}

pub fn coinbase<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_h256!(runtime, H256::from(handler.block_coinbase()));
	Control::Continue
}

pub fn timestamp<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_u256!(runtime, handler.block_timestamp());
	Control::Continue
}

pub fn number<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_u256!(runtime, handler.block_number());
	Control::Continue
}

pub fn difficulty<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_u256!(runtime, handler.block_difficulty());
	Control::Continue
}

pub fn gaslimit<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_u256!(runtime, handler.block_gas_limit());
	Control::Continue
}

pub fn sload<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, index);
	let value = handler.storage(runtime.context.address, index);
	push_h256!(runtime, value);

	Control::Continue
}

pub fn sstore<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, index, value);

	match handler.set_storage(runtime.context.address, index, value) {
		Ok(()) => Control::Continue,
		Err(e) => Control::Exit(e.into()),
	}
}

pub fn gas<H: Handler>(runtime: &mut Runtime, handler: &H) -> Control {
	push_u256!(runtime, handler.gas_left());

	Control::Continue
}

pub fn log<H: Handler>(runtime: &mut Runtime, n: u8, handler: &mut H) -> Control {
	pop_u256!(runtime, offset, len);

	try_or_fail!(runtime.machine.memory_mut().resize_offset(offset, len));
	let data = if len == U256::zero() {
		Vec::new()
	} else {
		let offset = as_usize_or_fail!(offset);
		let len = as_usize_or_fail!(len);

		runtime.machine.memory().get(offset, len)
	};

	let mut topics = Vec::new();
	for _ in 0..(n as usize) {
		match runtime.machine.stack_mut().pop_h256() {
			Ok(value) => {
				topics.push(value);
			}
			Err(e) => return Control::Exit(e.into()),
		}
	}

	match handler.log(runtime.context.address, topics, data) {
		Ok(()) => Control::Continue,
		Err(e) => Control::Exit(e.into()),
	}
}

pub fn suicide<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	pop_h256!(runtime, target);

	match handler.mark_delete(runtime.context.address, target.into()) {
		Ok(()) => (),
		Err(e) => return Control::Exit(e.into()),
	}

	Control::Exit(ExitSucceed::Suicided.into())
}

pub fn create<H: Handler>(runtime: &mut Runtime, handler: &mut H) -> Control {
	runtime.return_data_buffer = Vec::new();

	pop_u256!(runtime, value, code_offset, len);

	try_or_fail!(runtime.machine.memory_mut().resize_offset(code_offset, len));
	let code = if len == U256::zero() {
		Vec::new()
	} else {
		let code_offset = as_usize_or_fail!(code_offset);
		let len = as_usize_or_fail!(len);

		runtime.machine.memory().get(code_offset, len)
	};

	let scheme = CreateScheme::Legacy {
		caller: runtime.context.address,
	};

	match handler.create(runtime.context.address, scheme, value, code) {
		Ok((reason, address, return_data)) => {
			runtime.return_data_buffer = return_data;

			if reason.is_succeed() {
				match address {
					Some(address) => {
						push_h256!(runtime, H256::from(address));
					}
					None => {
						push_u256!(runtime, U256::zero());
					}
				}
			} else {
				push_u256!(runtime, U256::zero());
			}
			Control::Continue
		}
		Err(e) => Control::Exit(e.into()),
	}
}

pub fn call<H: Handler>(runtime: &mut Runtime, scheme: CallScheme, handler: &mut H) -> Control {
	runtime.return_data_buffer = Vec::new();

	pop_u256!(runtime, gas);
	pop_h256!(runtime, to);

	let value = match scheme {
		CallScheme::Call | CallScheme::CallCode => {
			pop_u256!(runtime, value);
			value
		}
		CallScheme::DelegateCall => U256::zero(),
	};

	pop_u256!(runtime, in_offset, in_len, out_offset, out_len);

	try_or_fail!(runtime
		.machine
		.memory_mut()
		.resize_offset(in_offset, in_len));
	try_or_fail!(runtime
		.machine
		.memory_mut()
		.resize_offset(out_offset, out_len));

	let input = if in_len == U256::zero() {
		Vec::new()
	} else {
		let in_offset = as_usize_or_fail!(in_offset);
		let in_len = as_usize_or_fail!(in_len);

		runtime.machine.memory().get(in_offset, in_len)
	};

	let context = match scheme {
		CallScheme::Call => Context {
			address: to.into(),
			caller: runtime.context.address,
			apparent_value: value,
		},
		CallScheme::CallCode => Context {
			address: runtime.context.address,
			caller: runtime.context.address,
			apparent_value: value,
		},
		CallScheme::DelegateCall => Context {
			address: runtime.context.address,
			caller: runtime.context.caller,
			apparent_value: runtime.context.apparent_value,
		},
	};

	let transfer = match scheme {
		CallScheme::Call => Some(Transfer {
			source: runtime.context.address,
			target: to.into(),
			value,
		}),
		CallScheme::CallCode => Some(Transfer {
			source: runtime.context.address,
			target: runtime.context.address,
			value,
		}),
		CallScheme::DelegateCall => None,
	};

	match handler.call(to.into(), transfer, input, gas, scheme, context) {
		Ok((reason, return_data)) => {
			runtime.return_data_buffer = return_data;
			let target_len = out_len.min(U256::from(runtime.return_data_buffer.len()));

			if reason.is_succeed() {
				match runtime.machine.memory_mut().copy_large(
					out_offset,
					U256::zero(),
					target_len,
					&runtime.return_data_buffer,
				) {
					Ok(()) => {
						push_u256!(runtime, U256::one());
					}
					Err(_) => {
						push_u256!(runtime, U256::zero());
					}
				}
			} else {
				push_u256!(runtime, U256::zero());
			}
			Control::Continue
		}
		Err(e) => Control::Exit(e.into()),
	}
}
