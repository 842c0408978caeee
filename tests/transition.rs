//! End-to-end block transitions over a shared in-memory store.

use embervm::{
	apply_transaction, block_state_transition, calc_difficulty, mk_transaction_proof,
	ordered_root, verify_transaction_proof, Block, BlockContext, BlockError, Bloom, ChainParams,
	Header, MemoryDB, Receipt, State, Transaction,
};
use primitive_types::{H160, H256, U256};

fn coinbase() -> H160 {
	H160::repeat_byte(0xcb)
}

fn signed(secret: &H256, nonce: u64, to: Option<H160>, value: u64, data: Vec<u8>) -> Transaction {
	let mut tx = Transaction::new(
		U256::from(nonce),
		U256::one(),
		500_000,
		to,
		U256::from(value),
		data,
	);
	tx.sign(secret).unwrap();
	tx
}

/// Genesis-like parent over a freshly committed state root.
fn genesis(state_root: H256) -> Header {
	Header {
		state_root,
		difficulty: U256::from(131_072),
		gas_limit: 3_141_592,
		..Header::default()
	}
}

/// Execute the transactions on a scratch state and build a block whose
/// header commits to the results.
fn sealed_block(
	db: &MemoryDB,
	params: &ChainParams,
	parent: &Header,
	ancestors: &[H256],
	timestamp: u64,
	transactions: Vec<Transaction>,
	uncles: Vec<Header>,
) -> Block {
	let mut scratch = State::open(db.clone(), parent.state_root);
	let number = parent.number + 1;
	let difficulty = calc_difficulty(params, parent, timestamp);
	let mut prev_hashes = vec![parent.hash()];
	prev_hashes.extend_from_slice(ancestors);
	let context = BlockContext {
		coinbase: coinbase(),
		timestamp,
		number,
		difficulty,
		gas_limit: parent.gas_limit,
		prev_hashes,
	};
	let config = params.config(number);

	let mut gas_used = 0u64;
	let mut bloom = Bloom::new();
	let mut receipts = Vec::new();
	for tx in &transactions {
		let outcome = apply_transaction(&mut scratch, &context, &config, tx, gas_used).unwrap();
		assert!(outcome.success);
		gas_used += outcome.gas_used;
		let receipt = Receipt::new(outcome.state_root, gas_used, outcome.logs);
		bloom.accrue(&receipt.bloom);
		receipts.push(receipt);
	}
	let udpf = params.uncle_depth_penalty_factor;
	for uncle in &uncles {
		let reward =
			params.block_reward * U256::from(udpf - (number - uncle.number)) / U256::from(udpf);
		scratch.add_balance(uncle.coinbase, reward);
	}
	scratch.add_balance(
		coinbase(),
		params.block_reward + params.nephew_reward * U256::from(uncles.len() as u64),
	);
	let state_root = scratch.commit().unwrap();

	Block {
		header: Header {
			prev_hash: parent.hash(),
			coinbase: coinbase(),
			state_root,
			tx_list_root: ordered_root(&transactions),
			receipts_root: ordered_root(&receipts),
			bloom,
			difficulty,
			number,
			gas_limit: parent.gas_limit,
			gas_used,
			timestamp,
			extra_data: Vec::new(),
		},
		transactions,
		uncles,
	}
}

#[test]
fn value_transfer_block() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);
	let recipient = H160::repeat_byte(0x99);
	let tx = signed(&secret, 0, Some(recipient), 7777, vec![]);
	let sender = tx.sender().unwrap();

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(10_000_000));
	let parent = genesis(state.commit().unwrap());

	let block = sealed_block(&db, &params, &parent, &[], 10, vec![tx], vec![]);
	assert_eq!(block.header.gas_used, 21_000);

	let mut state = State::open(db.clone(), parent.state_root);
	let receipts = block_state_transition(&mut state, &params, &parent, &[], &block).unwrap();

	assert_eq!(receipts.len(), 1);
	assert_eq!(receipts[0].gas_used, 21_000);
	assert_eq!(state.balance(recipient), U256::from(7777));
	assert_eq!(state.nonce(sender), U256::one());
	assert_eq!(
		state.balance(coinbase()),
		params.block_reward + U256::from(21_000)
	);
}

#[test]
fn contract_block_with_logs_and_proofs() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);

	// Runtime code: store 1 at slot 0, then emit an empty LOG0.
	let runtime_code = vec![
		0x60, 0x01, 0x60, 0x00, 0x55, // PUSH1 1, PUSH1 0, SSTORE
		0x60, 0x00, 0x60, 0x00, 0xa0, // PUSH1 0, PUSH1 0, LOG0
		0x00, // STOP
	];
	// Init code copies the trailing runtime code and returns it.
	let mut init_code = vec![
		0x60, 0x0b, 0x60, 0x0c, 0x60, 0x00, 0x39, // CODECOPY(0, 12, 11)
		0x60, 0x0b, 0x60, 0x00, 0xf3, // RETURN(0, 11)
	];
	init_code.extend_from_slice(&runtime_code);

	let create_tx = signed(&secret, 0, None, 0, init_code);
	let sender = create_tx.sender().unwrap();
	let contract = embervm::create_address(sender, U256::zero());
	let call_tx = signed(&secret, 1, Some(contract), 0, vec![]);

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(100_000_000));
	let parent = genesis(state.commit().unwrap());

	let block = sealed_block(
		&db,
		&params,
		&parent,
		&[],
		10,
		vec![create_tx, call_tx],
		vec![],
	);

	let mut state = State::open(db.clone(), parent.state_root);
	let receipts = block_state_transition(&mut state, &params, &parent, &[], &block).unwrap();

	assert_eq!(*state.code(contract), runtime_code);
	assert_eq!(
		state.storage(contract, H256::zero()),
		H256::from_low_u64_be(1)
	);
	assert_eq!(receipts[1].logs.len(), 1);
	assert_eq!(receipts[1].logs[0].address, contract);
	assert!(block.header.bloom.contains_input(contract.as_bytes()));

	// The call transaction is provable against the header alone.
	let proof = mk_transaction_proof(&block, 1).unwrap();
	let proven = verify_transaction_proof(block.header.tx_list_root, 1, &proof)
		.unwrap()
		.unwrap();
	assert_eq!(proven, block.transactions[1]);
}

#[test]
fn uncle_rewards_are_paid() {
	let params = ChainParams::default();
	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	let parent = genesis(state.commit().unwrap());

	let uncle_coinbase = H160::repeat_byte(0x77);
	let uncle = Header {
		coinbase: uncle_coinbase,
		number: 0,
		..Header::default()
	};
	let block = sealed_block(&db, &params, &parent, &[], 10, vec![], vec![uncle]);

	let mut state = State::open(db.clone(), parent.state_root);
	block_state_transition(&mut state, &params, &parent, &[], &block).unwrap();

	// Depth-one uncle earns 7/8 of the block reward.
	assert_eq!(
		state.balance(uncle_coinbase),
		params.block_reward * U256::from(7) / U256::from(8)
	);
	assert_eq!(
		state.balance(coinbase()),
		params.block_reward + params.nephew_reward
	);
}

#[test]
fn tampered_state_root_is_rejected() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);
	let tx = signed(&secret, 0, Some(H160::repeat_byte(0x99)), 1, vec![]);
	let sender = tx.sender().unwrap();

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(10_000_000));
	let parent = genesis(state.commit().unwrap());

	let mut block = sealed_block(&db, &params, &parent, &[], 10, vec![tx], vec![]);
	block.header.state_root = H256::repeat_byte(0xde);

	let mut state = State::open(db.clone(), parent.state_root);
	let err = block_state_transition(&mut state, &params, &parent, &[], &block).unwrap_err();
	assert!(matches!(err, BlockError::StateRootMismatch { .. }));
}

#[test]
fn wrong_difficulty_is_rejected() {
	let params = ChainParams::default();
	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	let parent = genesis(state.commit().unwrap());

	let mut block = sealed_block(&db, &params, &parent, &[], 10, vec![], vec![]);
	block.header.difficulty += U256::one();

	let mut state = State::open(db.clone(), parent.state_root);
	let err = block_state_transition(&mut state, &params, &parent, &[], &block).unwrap_err();
	assert_eq!(err, BlockError::InvalidDifficulty);
}

#[test]
fn failed_transaction_still_seals() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);
	let target = H160::repeat_byte(0x66);

	let tx = signed(&secret, 0, Some(target), 0, vec![]);
	let sender = tx.sender().unwrap();

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(10_000_000));
	// Target immediately hits an undefined opcode.
	state.set_code(target, vec![0xfe]);
	let parent = genesis(state.commit().unwrap());

	// Seal by hand since the helper asserts success.
	let mut scratch = State::open(db.clone(), parent.state_root);
	let context = BlockContext {
		coinbase: coinbase(),
		timestamp: 10,
		number: 1,
		difficulty: calc_difficulty(&params, &parent, 10),
		gas_limit: parent.gas_limit,
		prev_hashes: vec![parent.hash()],
	};
	let outcome =
		apply_transaction(&mut scratch, &context, &params.config(1), &tx, 0).unwrap();
	assert!(!outcome.success);
	assert_eq!(outcome.gas_used, 500_000);
	let receipts = vec![Receipt::new(outcome.state_root, 500_000, vec![])];
	scratch.add_balance(coinbase(), params.block_reward);
	let state_root = scratch.commit().unwrap();

	let block = Block {
		header: Header {
			prev_hash: parent.hash(),
			coinbase: coinbase(),
			state_root,
			tx_list_root: ordered_root(&[tx.clone()]),
			receipts_root: ordered_root(&receipts),
			bloom: Bloom::new(),
			difficulty: context.difficulty,
			number: 1,
			gas_limit: parent.gas_limit,
			gas_used: 500_000,
			timestamp: 10,
			extra_data: Vec::new(),
		},
		transactions: vec![tx],
		uncles: Vec::new(),
	};

	let mut state = State::open(db.clone(), parent.state_root);
	block_state_transition(&mut state, &params, &parent, &[], &block).unwrap();
	// The whole gas allowance went to the miner, the nonce still advanced.
	assert_eq!(
		state.balance(coinbase()),
		params.block_reward + U256::from(500_000)
	);
	assert_eq!(state.nonce(sender), U256::one());
}

#[test]
fn selfdestruct_is_deferred_until_transaction_end() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);

	let target = H160::repeat_byte(0xaa);
	let driver = H160::repeat_byte(0xbb);
	let beneficiary = H160::zero();

	// First call: slot 0 is empty, so store 1 there and self-destruct.
	// Second call: slot 0 is set, so return it — the account and its
	// storage must still be readable, since deletion waits for the end of
	// the transaction.
	let target_code = vec![
		0x60, 0x00, 0x54, // PUSH1 0, SLOAD
		0x60, 0x0e, 0x57, // PUSH1 14, JUMPI
		0x60, 0x01, 0x60, 0x00, 0x55, // store 1 at slot 0
		0x60, 0x00, 0xff, // SUICIDE to the zero address
		0x5b, // JUMPDEST
		0x60, 0x00, 0x54, // reload slot 0
		0x60, 0x00, 0x52, // MSTORE at 0
		0x60, 0x20, 0x60, 0x00, 0xf3, // RETURN 32 bytes
	];
	// The driver calls the target twice and records the second call's
	// return value in its own slot 0.
	let mut driver_code = Vec::new();
	for out_len in [0x00u8, 0x20] {
		driver_code.extend_from_slice(&[
			0x60, out_len, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x73,
		]);
		driver_code.extend_from_slice(target.as_bytes());
		driver_code.extend_from_slice(&[0x61, 0xc3, 0x50, 0xf1, 0x50]);
	}
	driver_code.extend_from_slice(&[0x60, 0x00, 0x51, 0x60, 0x00, 0x55, 0x00]);

	let tx = signed(&secret, 0, Some(driver), 0, vec![]);
	let sender = tx.sender().unwrap();

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(10_000_000));
	state.set_balance(target, U256::from(999));
	state.set_code(target, target_code);
	state.set_code(driver, driver_code);
	let parent = genesis(state.commit().unwrap());

	let block = sealed_block(&db, &params, &parent, &[], 10, vec![tx], vec![]);
	let mut state = State::open(db.clone(), parent.state_root);
	block_state_transition(&mut state, &params, &parent, &[], &block).unwrap();

	// The second call inside the transaction saw the stored value.
	assert_eq!(
		state.storage(driver, H256::zero()),
		H256::from_low_u64_be(1)
	);
	// Afterwards the account is gone and its balance moved.
	assert!(!state.exists(target));
	assert_eq!(state.balance(target), U256::zero());
	assert_eq!(state.balance(beneficiary), U256::from(999));
	assert_eq!(state.storage(target, H256::zero()), H256::zero());
}

#[test]
fn blockhash_reaches_past_the_parent() {
	let params = ChainParams::default();
	let secret = H256::repeat_byte(0x21);
	let reader = H160::repeat_byte(0xcc);
	// Store BLOCKHASH(1) into slot 0.
	let code = vec![0x60, 0x01, 0x40, 0x60, 0x00, 0x55, 0x00];

	let tx = signed(&secret, 0, Some(reader), 0, vec![]);
	let sender = tx.sender().unwrap();

	let db = MemoryDB::new();
	let mut state = State::new(db.clone());
	state.set_balance(sender, U256::from(10_000_000));
	state.set_code(reader, code);
	let root = state.commit().unwrap();

	let parent = Header {
		state_root: root,
		number: 2,
		timestamp: 50,
		difficulty: U256::from(131_072),
		gas_limit: 3_141_592,
		..Header::default()
	};
	let grandparent_hash = H256::repeat_byte(0x11);
	let ancestors = [grandparent_hash, H256::repeat_byte(0x22)];

	let block = sealed_block(&db, &params, &parent, &ancestors, 60, vec![tx], vec![]);
	let mut state = State::open(db.clone(), parent.state_root);
	block_state_transition(&mut state, &params, &parent, &ancestors, &block).unwrap();

	// Block 3 asking for block 1 lands on the grandparent's hash.
	assert_eq!(state.storage(reader, H256::zero()), grandparent_hash);
}
