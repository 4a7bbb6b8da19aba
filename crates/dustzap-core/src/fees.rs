//! Protocol fee computation.
//!
//! The fee is a share of the converted USD value, paid in wrapped native
//! asset: the account wraps the fee amount, then transfers it to the
//! treasury, or splits it between referrer and treasury when the account
//! was referred.

use alloy_primitives::{utils::parse_ether, Address, U256};
use alloy_sol_types::{sol, SolCall};
use dustzap_config::EngineConfig;
use dustzap_sdk::ReferrerLookup;
use dustzap_types::{format_token_amount, ChainMetadata, FeePlan, Operation};
use std::sync::Arc;
use thiserror::Error;

sol! {
	interface IWrappedNative {
		function deposit() external payable;
		function transfer(address to, uint256 amount) external returns (bool);
	}
}

/// Smallest fee worth charging, in ETH. Anything below rounds to zero wei.
const MIN_FEE_ETH: f64 = 1e-18;

#[derive(Debug, Error)]
pub enum FeeError {
	#[error("Invalid ETH price: {0}")]
	InvalidPrice(f64),
	#[error("Invalid USD value: {0}")]
	InvalidValue(f64),
	#[error("Failed to convert fee to wei: {0}")]
	Conversion(String),
}

/// Computes protocol fees and the operations that pay them.
pub struct FeeCalculator {
	fee_rate: f64,
	referral_fee_percent: u8,
	treasury: Address,
	referrers: Arc<dyn ReferrerLookup>,
}

impl FeeCalculator {
	pub fn new(config: &EngineConfig, referrers: Arc<dyn ReferrerLookup>) -> Self {
		Self {
			fee_rate: config.fee_rate,
			referral_fee_percent: config.referral_fee_percent.min(100),
			treasury: config.treasury_address,
			referrers,
		}
	}

	/// Looks up the account's referrer and builds the fee plan.
	///
	/// A failed lookup is logged and treated as "no referrer".
	pub async fn compute_fees(
		&self,
		total_value_usd: f64,
		chain: &ChainMetadata,
		account: Address,
		eth_price: f64,
	) -> Result<FeePlan, FeeError> {
		let fee_amount = self.fee_amount_native(total_value_usd, eth_price)?;
		if fee_amount.is_zero() {
			tracing::debug!(total_value_usd, "Fee below one wei, skipping");
			return Ok(FeePlan::empty());
		}

		let referrer = match self.referrers.referrer_of(account).await {
			Ok(referrer) => referrer,
			Err(e) => {
				tracing::warn!(account = %account, error = %e, "Referrer lookup failed, charging treasury only");
				None
			},
		};

		Ok(self.build_plan(total_value_usd, chain, fee_amount, referrer))
	}

	/// Builds the fee plan for a known referrer.
	pub fn fee_plan(
		&self,
		total_value_usd: f64,
		chain: &ChainMetadata,
		eth_price: f64,
		referrer: Option<Address>,
	) -> Result<FeePlan, FeeError> {
		let fee_amount = self.fee_amount_native(total_value_usd, eth_price)?;
		if fee_amount.is_zero() {
			return Ok(FeePlan::empty());
		}
		Ok(self.build_plan(total_value_usd, chain, fee_amount, referrer))
	}

	/// Splits a non-zero `fee_amount` between referrer and treasury.
	fn build_plan(
		&self,
		total_value_usd: f64,
		chain: &ChainMetadata,
		fee_amount: U256,
		referrer: Option<Address>,
	) -> FeePlan {
		let weth = chain.wrapped_native_address;
		let mut fee_operations = vec![Operation::new(
			weth,
			fee_amount,
			IWrappedNative::depositCall {}.abi_encode(),
		)];

		match referrer {
			Some(referrer) => {
				let referral_fee =
					fee_amount * U256::from(self.referral_fee_percent) / U256::from(100u8);
				let treasury_fee = fee_amount - referral_fee;
				fee_operations.push(transfer(weth, referrer, referral_fee));
				fee_operations.push(transfer(weth, self.treasury, treasury_fee));
			},
			None => fee_operations.push(transfer(weth, self.treasury, fee_amount)),
		}

		let plan = FeePlan {
			fee_operations,
			fee_amount_native: fee_amount,
			fee_usd: total_value_usd * self.fee_rate,
			referrer,
		};
		tracing::info!(
			chain_id = chain.chain_id,
			fee_usd = plan.fee_usd,
			fee_eth = %format_token_amount(&plan.fee_amount_native.to_string(), 18),
			referred = referrer.is_some(),
			"Computed protocol fee"
		);
		plan
	}

	/// Fee in wei, or zero when it falls below one wei.
	fn fee_amount_native(&self, total_value_usd: f64, eth_price: f64) -> Result<U256, FeeError> {
		if !eth_price.is_finite() || eth_price <= 0.0 {
			return Err(FeeError::InvalidPrice(eth_price));
		}
		if !total_value_usd.is_finite() {
			return Err(FeeError::InvalidValue(total_value_usd));
		}

		let fee_eth = total_value_usd * self.fee_rate / eth_price;
		if !fee_eth.is_finite() {
			return Err(FeeError::InvalidValue(total_value_usd));
		}
		if fee_eth < MIN_FEE_ETH {
			return Ok(U256::ZERO);
		}
		parse_ether(&format!("{:.18}", fee_eth)).map_err(|e| FeeError::Conversion(e.to_string()))
	}
}

fn transfer(token: Address, to: Address, amount: U256) -> Operation {
	Operation::call(token, IWrappedNative::transferCall { to, amount }.abi_encode())
}
