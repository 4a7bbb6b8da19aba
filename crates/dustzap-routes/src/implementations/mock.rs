//! Synthetic route service for local development and tests.
//!
//! Produces one swap call per selected token against a configurable router
//! and reports a fixed share of each token's value as trading loss.

use crate::{
	forward_status, RouteBundle, RouteError, RouteRequest, RouteServiceFactory,
	RouteServiceInterface, RouteServiceRegistry,
};
use alloy_primitives::{utils::parse_ether, Address};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use dustzap_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Operation, Schema, StatusMessage,
	ValidationError,
};
use serde::Deserialize;
use tokio::sync::mpsc;

sol! {
	interface IDustRouter {
		function swapExactTokensForEth(address token, uint256 amountIn, uint256 minAmountOut, address recipient);
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockRouteServiceConfig {
	/// Router receiving the synthetic swap calls.
	#[serde(default)]
	pub router_address: Address,
	/// Share of each token's USD value lost to the swap.
	#[serde(default = "default_loss_ratio")]
	pub loss_ratio: f64,
	/// Fallback USD price of the output asset when the request carries none.
	#[serde(default = "default_output_price")]
	pub output_price_usd: f64,
}

fn default_loss_ratio() -> f64 {
	0.01
}

fn default_output_price() -> f64 {
	3000.0
}

impl Default for MockRouteServiceConfig {
	fn default() -> Self {
		Self {
			router_address: Address::ZERO,
			loss_ratio: default_loss_ratio(),
			output_price_usd: default_output_price(),
		}
	}
}

pub struct MockRouteServiceSchema;

impl ConfigSchema for MockRouteServiceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("router_address", FieldType::Address),
				Field::new(
					"loss_ratio",
					FieldType::Float {
						min: Some(0.0),
						max: Some(1.0),
					},
				),
				Field::new(
					"output_price_usd",
					FieldType::Float {
						min: Some(0.0),
						max: None,
					},
				)
				.with_validator(|value| match value.as_float() {
					Some(price) if price <= 0.0 => {
						Err("output_price_usd must be positive".to_string())
					},
					_ => Ok(()),
				}),
			],
		);
		schema.validate(config)
	}
}

pub struct MockRouteService {
	config: MockRouteServiceConfig,
}

impl MockRouteService {
	pub fn new(config: MockRouteServiceConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl RouteServiceInterface for MockRouteService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockRouteServiceSchema)
	}

	async fn fetch_routes(
		&self,
		request: &RouteRequest,
		status: mpsc::UnboundedSender<StatusMessage>,
	) -> Result<RouteBundle, RouteError> {
		let eth_price = request
			.eth_price()
			.filter(|price| price.is_finite() && *price > 0.0)
			.unwrap_or(self.config.output_price_usd);
		let total_steps = request.tokens.len();
		let mut operations = Vec::with_capacity(total_steps);
		let mut aggregate_loss = 0.0;

		for (step, token) in request.tokens.iter().enumerate() {
			let amount_in = parse_ether(&format!("{:.18}", token.amount)).map_err(|e| {
				RouteError::InvalidRequest(format!("Invalid amount for {}: {}", token.id, e))
			})?;
			let value = token.value_usd();
			let loss = value * self.config.loss_ratio;
			let output_amount = (value - loss) / eth_price;
			let min_out = parse_ether(&format!(
				"{:.18}",
				output_amount * (1.0 - request.slippage / 100.0)
			))
			.unwrap_or_default();

			let call = IDustRouter::swapExactTokensForEthCall {
				token: token.address.unwrap_or_default(),
				amountIn: amount_in,
				minAmountOut: min_out,
				recipient: request.account_address,
			};
			operations.push(Operation::call(self.config.router_address, call.abi_encode()));
			aggregate_loss += loss;

			forward_status(
				&status,
				StatusMessage {
					from_token: token.display_symbol().to_string(),
					to_token: "ETH".to_string(),
					amount: token.amount,
					output_amount,
					trading_loss: loss,
					dex_aggregator: "mock".to_string(),
					total_steps: (step == 0).then_some(total_steps),
				},
			);
		}

		Ok(RouteBundle {
			operations,
			aggregate_trading_loss_usd: aggregate_loss,
		})
	}
}

/// Registry for the mock route service implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = RouteServiceFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn RouteServiceInterface>, RouteError> {
			MockRouteServiceSchema
				.validate(config)
				.map_err(|e| RouteError::Configuration(e.to_string()))?;
			let mock_config: MockRouteServiceConfig = config.clone().try_into().map_err(|e| {
				RouteError::Configuration(format!("Invalid mock config: {}", e))
			})?;
			Ok(Box::new(MockRouteService::new(mock_config)))
		}
	}
}

impl RouteServiceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use dustzap_types::TokenBalance;

	fn token(id: &str, amount: f64, price: f64) -> TokenBalance {
		TokenBalance {
			id: id.to_string(),
			symbol: id.to_uppercase(),
			optimized_symbol: None,
			address: Some(Address::repeat_byte(0x11)),
			amount,
			price,
		}
	}

	#[tokio::test]
	async fn test_one_operation_per_token() {
		let service = MockRouteService::new(MockRouteServiceConfig {
			loss_ratio: 0.1,
			..Default::default()
		});
		let request = RouteRequest::new(
			vec![token("usdc", 10.0, 1.0), token("dai", 5.0, 1.0)],
			8453,
			Address::repeat_byte(0x22),
			3000.0,
			49.0,
		);
		let (tx, mut rx) = mpsc::unbounded_channel();

		let bundle = service.fetch_routes(&request, tx).await.unwrap();

		assert_eq!(bundle.operations.len(), 2);
		assert!((bundle.aggregate_trading_loss_usd - 1.5).abs() < 1e-9);

		let first = rx.recv().await.unwrap();
		assert_eq!(first.from_token, "USDC");
		assert_eq!(first.total_steps, Some(2));
		let second = rx.recv().await.unwrap();
		assert_eq!(second.from_token, "DAI");
		assert_eq!(second.total_steps, None);
		assert!(rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_closed_receiver_is_ignored() {
		let service = MockRouteService::new(MockRouteServiceConfig::default());
		let request = RouteRequest::new(vec![token("usdc", 1.0, 1.0)], 8453, Address::ZERO, 3000.0, 49.0);
		let (tx, rx) = mpsc::unbounded_channel();
		drop(rx);

		let bundle = service.fetch_routes(&request, tx).await.unwrap();
		assert_eq!(bundle.operations.len(), 1);
	}

	#[tokio::test]
	async fn test_output_amount_uses_request_eth_price() {
		let service = MockRouteService::new(MockRouteServiceConfig {
			loss_ratio: 0.0,
			output_price_usd: 3000.0,
			..Default::default()
		});
		let request = RouteRequest::new(
			vec![token("usdc", 2000.0, 1.0)],
			8453,
			Address::ZERO,
			2000.0,
			49.0,
		);
		let (tx, mut rx) = mpsc::unbounded_channel();

		service.fetch_routes(&request, tx).await.unwrap();

		let status = rx.recv().await.unwrap();
		assert!((status.output_amount - 1.0).abs() < 1e-9);
	}

	#[test]
	fn test_loss_ratio_bounds() {
		let config = toml::Value::Table(toml::from_str("loss_ratio = 1.5").unwrap());
		assert!(Registry::factory()(&config).is_err());
	}
}
