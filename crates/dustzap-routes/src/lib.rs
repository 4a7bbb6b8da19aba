//! Swap route discovery for the DustZap conversion engine.
//!
//! A route service turns the selected dust balances into executable swap
//! operations. While it works it streams [`StatusMessage`]s describing each
//! step through an unbounded channel; the coordinator drains that channel
//! with a single reader so the message log keeps arrival order.

use async_trait::async_trait;
use dustzap_types::{
	Address, ConfigSchema, ImplementationRegistry, Operation, StatusMessage, TokenBalance,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors that can occur while fetching swap routes.
#[derive(Debug, Error)]
pub enum RouteError {
	/// Error that occurs during network communication with the route service.
	#[error("Network error: {0}")]
	Network(String),
	/// The route service rejected the request or returned an unusable answer.
	#[error("Invalid route response: {0}")]
	InvalidResponse(String),
	/// The request cannot be routed.
	#[error("Invalid route request: {0}")]
	InvalidRequest(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Everything a route service needs to build swaps for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
	pub tokens: Vec<TokenBalance>,
	pub chain_id: u64,
	pub account_address: Address,
	/// USD price per token id, plus the attempt's ETH price under [`ETH_PRICE_KEY`].
	pub price_table: HashMap<String, f64>,
	/// Slippage tolerance in percent.
	pub slippage: f64,
}

/// Price table key holding the USD price of the output asset.
pub const ETH_PRICE_KEY: &str = "eth";

impl RouteRequest {
	pub fn new(
		tokens: Vec<TokenBalance>,
		chain_id: u64,
		account_address: Address,
		eth_price: f64,
		slippage: f64,
	) -> Self {
		let mut price_table: HashMap<String, f64> = tokens
			.iter()
			.map(|token| (token.id.clone(), token.price))
			.collect();
		price_table.insert(ETH_PRICE_KEY.to_string(), eth_price);
		Self {
			tokens,
			chain_id,
			account_address,
			price_table,
			slippage,
		}
	}

	/// USD price of ETH fetched for this attempt.
	pub fn eth_price(&self) -> Option<f64> {
		self.price_table.get(ETH_PRICE_KEY).copied()
	}
}

/// Executable swaps plus the loss the route service expects them to incur.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteBundle {
	pub operations: Vec<Operation>,
	/// Authoritative USD trading loss across all swaps.
	pub aggregate_trading_loss_usd: f64,
}

/// Trait defining the interface for route service implementations.
#[async_trait]
pub trait RouteServiceInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Builds swap operations for the request.
	///
	/// Progress messages are sent on `status` in step order. A closed
	/// receiver is not an error.
	async fn fetch_routes(
		&self,
		request: &RouteRequest,
		status: mpsc::UnboundedSender<StatusMessage>,
	) -> Result<RouteBundle, RouteError>;
}

/// Type alias for route service factory functions.
pub type RouteServiceFactory =
	fn(&toml::Value) -> Result<Box<dyn RouteServiceInterface>, RouteError>;

/// Registry trait for route service implementations.
pub trait RouteServiceRegistry: ImplementationRegistry<Factory = RouteServiceFactory> {}

/// Get all registered route service implementations.
pub fn get_all_implementations() -> Vec<(&'static str, RouteServiceFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service wrapping the configured route implementation.
pub struct RouteService {
	implementation: Arc<dyn RouteServiceInterface>,
}

impl RouteService {
	pub fn new(implementation: Arc<dyn RouteServiceInterface>) -> Self {
		Self { implementation }
	}

	/// Fetches routes, rejecting bundles with a non-finite loss.
	pub async fn fetch_routes(
		&self,
		request: &RouteRequest,
		status: mpsc::UnboundedSender<StatusMessage>,
	) -> Result<RouteBundle, RouteError> {
		if request.tokens.is_empty() {
			return Err(RouteError::InvalidRequest("No tokens selected".into()));
		}
		if !(0.0..=100.0).contains(&request.slippage) {
			return Err(RouteError::InvalidRequest(format!(
				"Slippage must be within [0, 100], got {}",
				request.slippage
			)));
		}

		let bundle = self.implementation.fetch_routes(request, status).await?;
		if !bundle.aggregate_trading_loss_usd.is_finite() {
			return Err(RouteError::InvalidResponse(
				"aggregate_trading_loss_usd is not a finite number".into(),
			));
		}

		tracing::info!(
			chain_id = request.chain_id,
			tokens = request.tokens.len(),
			operations = bundle.operations.len(),
			trading_loss = bundle.aggregate_trading_loss_usd,
			"Fetched swap routes"
		);
		Ok(bundle)
	}
}

/// Sends a status message, ignoring a closed receiver.
pub(crate) fn forward_status(status: &mpsc::UnboundedSender<StatusMessage>, message: StatusMessage) {
	if status.send(message).is_err() {
		tracing::debug!("Status receiver dropped, discarding route step");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::mock::{MockRouteService, MockRouteServiceConfig};

	fn token(id: &str, amount: f64, price: f64) -> TokenBalance {
		TokenBalance {
			id: id.to_string(),
			symbol: id.to_uppercase(),
			optimized_symbol: None,
			address: None,
			amount,
			price,
		}
	}

	#[test]
	fn test_request_builds_price_table() {
		let request = RouteRequest::new(
			vec![token("usdc", 2.0, 1.0), token("pepe", 1000.0, 0.0001)],
			8453,
			Address::ZERO,
			2500.0,
			49.0,
		);
		assert_eq!(request.price_table.get("usdc"), Some(&1.0));
		assert_eq!(request.price_table.get("pepe"), Some(&0.0001));
		assert_eq!(request.eth_price(), Some(2500.0));
		assert_eq!(request.price_table.get(ETH_PRICE_KEY), Some(&2500.0));
	}

	#[tokio::test]
	async fn test_service_rejects_empty_selection() {
		let service = RouteService::new(Arc::new(MockRouteService::new(
			MockRouteServiceConfig::default(),
		)));
		let (tx, _rx) = mpsc::unbounded_channel();
		let request = RouteRequest::new(vec![], 8453, Address::ZERO, 3000.0, 49.0);

		assert!(matches!(
			service.fetch_routes(&request, tx).await,
			Err(RouteError::InvalidRequest(_))
		));
	}

	#[tokio::test]
	async fn test_service_rejects_out_of_range_slippage() {
		let service = RouteService::new(Arc::new(MockRouteService::new(
			MockRouteServiceConfig::default(),
		)));
		let (tx, _rx) = mpsc::unbounded_channel();
		let request = RouteRequest::new(vec![token("usdc", 1.0, 1.0)], 8453, Address::ZERO, 3000.0, 150.0);

		assert!(service.fetch_routes(&request, tx).await.is_err());
	}
}
