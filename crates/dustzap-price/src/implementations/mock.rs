//! Fixed-price feed for local development and tests.

use crate::{PriceFeedError, PriceFeedFactory, PriceFeedInterface, PriceFeedRegistry};
use async_trait::async_trait;
use dustzap_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Configuration for the mock price feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockPriceFeedConfig {
	/// Price returned for every request.
	#[serde(default = "default_eth_price")]
	pub eth_price_usd: f64,
}

fn default_eth_price() -> f64 {
	3000.0
}

impl Default for MockPriceFeedConfig {
	fn default() -> Self {
		Self {
			eth_price_usd: default_eth_price(),
		}
	}
}

pub struct MockPriceFeedSchema;

impl ConfigSchema for MockPriceFeedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"eth_price_usd",
				FieldType::Float {
					min: Some(0.0),
					max: None,
				},
			)],
		);
		schema.validate(config)
	}
}

/// Price feed that always answers with the configured price.
pub struct MockPriceFeed {
	config: MockPriceFeedConfig,
}

impl MockPriceFeed {
	pub fn new(config: MockPriceFeedConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl PriceFeedInterface for MockPriceFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockPriceFeedSchema)
	}

	async fn get_eth_price(&self) -> Result<f64, PriceFeedError> {
		Ok(self.config.eth_price_usd)
	}
}

/// Registry for the mock price feed implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PriceFeedFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn PriceFeedInterface>, PriceFeedError> {
			MockPriceFeedSchema
				.validate(config)
				.map_err(|e| PriceFeedError::Configuration(e.to_string()))?;
			let mock_config: MockPriceFeedConfig = config.clone().try_into().map_err(|e| {
				PriceFeedError::Configuration(format!("Invalid mock config: {}", e))
			})?;

			Ok(Box::new(MockPriceFeed::new(mock_config)))
		}
	}
}

impl PriceFeedRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_factory_uses_configured_price() {
		let config = toml::Value::Table(toml::from_str("eth_price_usd = 1800.5").unwrap());
		let feed = Registry::factory()(&config).unwrap();

		assert_eq!(feed.get_eth_price().await.unwrap(), 1800.5);
	}

	#[tokio::test]
	async fn test_factory_default_price() {
		let config = toml::Value::Table(toml::Table::new());
		let feed = Registry::factory()(&config).unwrap();

		assert_eq!(feed.get_eth_price().await.unwrap(), 3000.0);
	}

	#[test]
	fn test_negative_price_rejected() {
		let config = toml::Value::Table(toml::from_str("eth_price_usd = -1.0").unwrap());
		assert!(Registry::factory()(&config).is_err());
	}
}
