use ember_gasometer::Config;
use primitive_types::U256;

/// Consensus constants for difficulty and gas-limit retargeting, rewards
/// and fork scheduling. Defaults are the main-network values.
#[derive(Clone, Debug)]
pub struct ChainParams {
	pub min_gas_limit: u64,
	pub genesis_gas_limit: u64,
	/// Denominator of the exponential moving average the gas limit decays
	/// and grows by.
	pub gas_limit_ema_factor: u64,
	/// Maximum per-block gas limit change, as a divisor of the parent
	/// limit.
	pub gas_limit_adjmax_factor: u64,
	pub gas_limit_usage_nom: u64,
	pub gas_limit_usage_den: u64,
	/// Divisor of the parent difficulty giving the retarget step.
	pub block_diff_factor: u64,
	pub min_diff: u64,
	/// Timestamp delta below which difficulty rises (pre-homestead rule).
	pub diff_adjustment_cutoff: u64,
	pub homestead_diff_adjustment_cutoff: u64,
	/// Period, in blocks, of the exponential difficulty bomb.
	pub expdiff_period: u64,
	pub expdiff_free_periods: u64,
	pub homestead_fork_block: u64,
	pub block_reward: U256,
	pub nephew_reward: U256,
	pub uncle_depth_penalty_factor: u64,
	pub max_uncles: usize,
	pub max_extra_data: usize,
}

impl Default for ChainParams {
	fn default() -> Self {
		let block_reward = U256::from(5_000_000_000_000_000_000u64);
		ChainParams {
			min_gas_limit: 5000,
			genesis_gas_limit: 3_141_592,
			gas_limit_ema_factor: 1024,
			gas_limit_adjmax_factor: 1024,
			gas_limit_usage_nom: 3,
			gas_limit_usage_den: 2,
			block_diff_factor: 2048,
			min_diff: 131_072,
			diff_adjustment_cutoff: 13,
			homestead_diff_adjustment_cutoff: 10,
			expdiff_period: 100_000,
			expdiff_free_periods: 2,
			homestead_fork_block: 1_150_000,
			block_reward,
			nephew_reward: block_reward / 32,
			uncle_depth_penalty_factor: 8,
			max_uncles: 2,
			max_extra_data: 32,
		}
	}
}

impl ChainParams {
	pub fn is_homestead(&self, number: u64) -> bool {
		number >= self.homestead_fork_block
	}

	/// Interpreter configuration for a block at the given height.
	pub fn config(&self, number: u64) -> Config {
		if self.is_homestead(number) {
			Config::homestead()
		} else {
			Config::frontier()
		}
	}
}
