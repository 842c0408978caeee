//! Gas schedule constants (frontier/homestead values).

pub const G_MEMORY: u64 = 3;
pub const G_QUADRATIC_MEM_DENOM: u64 = 512;
pub const G_STORAGE_REFUND: u64 = 15000;
pub const G_STORAGE_KILL: u64 = 5000;
pub const G_STORAGE_MOD: u64 = 5000;
pub const G_STORAGE_ADD: u64 = 20000;
pub const G_EXPONENT_BYTE: u64 = 10;
pub const G_COPY: u64 = 3;
pub const G_CONTRACT_BYTE: u64 = 200;
pub const G_CALL_VALUE_TRANSFER: u64 = 9000;
pub const G_LOG_BYTE: u64 = 8;
pub const G_TX_COST: u64 = 21000;
pub const G_TX_DATA_ZERO: u64 = 4;
pub const G_TX_DATA_NONZERO: u64 = 68;
pub const G_SHA3_WORD: u64 = 6;
pub const G_SHA256_BASE: u64 = 60;
pub const G_SHA256_WORD: u64 = 12;
pub const G_RIPEMD160_BASE: u64 = 600;
pub const G_RIPEMD160_WORD: u64 = 120;
pub const G_IDENTITY_BASE: u64 = 15;
pub const G_IDENTITY_WORD: u64 = 3;
pub const G_ECRECOVER: u64 = 3000;
pub const G_BN_ADD: u64 = 500;
pub const G_BN_MUL: u64 = 40000;
pub const G_CALL_STIPEND: u64 = 2300;
pub const G_CALL_NEW_ACCOUNT: u64 = 25000;
pub const G_SUICIDE_REFUND: u64 = 24000;

/// Stack depth limit for every frame.
pub const STACK_LIMIT: usize = 1024;
/// Maximum message-call / create nesting.
pub const CALL_DEPTH_LIMIT: usize = 1024;
