//! ETH price feed for the DustZap conversion engine.
//!
//! The engine needs exactly one number from the outside world before it can
//! size the protocol fee: the current USD price of the native asset. This
//! crate defines the interface for obtaining it and ships an HTTP client for
//! the price API plus a fixed-price mock.

use async_trait::async_trait;
use dustzap_types::{ConfigSchema, ImplementationRegistry};
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors that can occur during price feed operations.
#[derive(Debug, Error)]
pub enum PriceFeedError {
	/// Error that occurs during network communication with the price source.
	#[error("Network error: {0}")]
	Network(String),
	/// The source answered but without a usable price.
	#[error("Price data unavailable: {0}")]
	PriceUnavailable(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for price feed implementations.
#[async_trait]
pub trait PriceFeedInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Current USD price of one unit of the native asset.
	async fn get_eth_price(&self) -> Result<f64, PriceFeedError>;
}

/// Type alias for price feed factory functions.
pub type PriceFeedFactory =
	fn(&toml::Value) -> Result<Box<dyn PriceFeedInterface>, PriceFeedError>;

/// Registry trait for price feed implementations.
pub trait PriceFeedRegistry: ImplementationRegistry<Factory = PriceFeedFactory> {}

/// Get all registered price feed implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PriceFeedFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service wrapping the configured price feed.
///
/// Rejects prices that cannot be used for fee math so callers never divide
/// by zero or propagate NaN.
pub struct PriceFeedService {
	implementation: Arc<dyn PriceFeedInterface>,
}

impl PriceFeedService {
	pub fn new(implementation: Arc<dyn PriceFeedInterface>) -> Self {
		Self { implementation }
	}

	/// Fetches the ETH price from the underlying implementation.
	pub async fn get_eth_price(&self) -> Result<f64, PriceFeedError> {
		let price = self.implementation.get_eth_price().await?;
		if !price.is_finite() || price <= 0.0 {
			return Err(PriceFeedError::PriceUnavailable(format!(
				"Price source returned {}",
				price
			)));
		}
		tracing::debug!(eth_price = price, "Fetched ETH price");
		Ok(price)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::mock::{MockPriceFeed, MockPriceFeedConfig};

	#[tokio::test]
	async fn test_service_passes_valid_price() {
		let feed = MockPriceFeed::new(MockPriceFeedConfig { eth_price_usd: 2500.0 });
		let service = PriceFeedService::new(Arc::new(feed));

		assert_eq!(service.get_eth_price().await.unwrap(), 2500.0);
	}

	#[tokio::test]
	async fn test_service_rejects_zero_price() {
		let feed = MockPriceFeed::new(MockPriceFeedConfig { eth_price_usd: 0.0 });
		let service = PriceFeedService::new(Arc::new(feed));

		assert!(matches!(
			service.get_eth_price().await,
			Err(PriceFeedError::PriceUnavailable(_))
		));
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["http", "mock"]);
	}
}
