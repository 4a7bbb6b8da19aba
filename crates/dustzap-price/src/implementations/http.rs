//! Price feed backed by the SDK price API.
//!
//! Issues `GET {base_url}/token/{symbol}/price?coinmarketcap_id={id}` and
//! reads the `price` field of the JSON response.

use crate::{PriceFeedError, PriceFeedFactory, PriceFeedInterface, PriceFeedRegistry};
use async_trait::async_trait;
use dustzap_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use serde::Deserialize;
use std::time::Duration;

/// CoinMarketCap identifier of ETH.
const ETH_COINMARKETCAP_ID: u64 = 2396;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpPriceFeedConfig {
	pub base_url: String,
	#[serde(default = "default_symbol")]
	pub symbol: String,
	#[serde(default = "default_coinmarketcap_id")]
	pub coinmarketcap_id: u64,
	#[serde(default = "default_timeout")]
	pub timeout_seconds: u64,
}

fn default_symbol() -> String {
	"eth".to_string()
}

fn default_coinmarketcap_id() -> u64 {
	ETH_COINMARKETCAP_ID
}

fn default_timeout() -> u64 {
	10
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
	price: Option<f64>,
}

pub struct HttpPriceFeedSchema;

impl ConfigSchema for HttpPriceFeedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("base_url must be an http(s) URL".to_string()),
				}
			})],
			vec![
				Field::new("symbol", FieldType::String),
				Field::new(
					"coinmarketcap_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		);
		schema.validate(config)
	}
}

pub struct HttpPriceFeed {
	client: reqwest::Client,
	config: HttpPriceFeedConfig,
}

impl HttpPriceFeed {
	pub fn new(config: HttpPriceFeedConfig) -> Result<Self, PriceFeedError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_seconds))
			.build()
			.map_err(|e| PriceFeedError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self { client, config })
	}

	fn price_url(&self) -> String {
		format!(
			"{}/token/{}/price",
			self.config.base_url.trim_end_matches('/'),
			self.config.symbol
		)
	}
}

#[async_trait]
impl PriceFeedInterface for HttpPriceFeed {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpPriceFeedSchema)
	}

	async fn get_eth_price(&self) -> Result<f64, PriceFeedError> {
		let response = self
			.client
			.get(self.price_url())
			.query(&[("coinmarketcap_id", self.config.coinmarketcap_id)])
			.send()
			.await
			.map_err(|e| PriceFeedError::Network(format!("Price request failed: {}", e)))?
			.error_for_status()
			.map_err(|e| PriceFeedError::Network(format!("Price API error: {}", e)))?;

		let body: PriceResponse = response
			.json()
			.await
			.map_err(|e| PriceFeedError::PriceUnavailable(format!("Malformed price response: {}", e)))?;

		body.price.ok_or_else(|| {
			PriceFeedError::PriceUnavailable(format!("No price for '{}'", self.config.symbol))
		})
	}
}

/// Registry for the HTTP price feed implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = PriceFeedFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn PriceFeedInterface>, PriceFeedError> {
			HttpPriceFeedSchema
				.validate(config)
				.map_err(|e| PriceFeedError::Configuration(e.to_string()))?;
			let http_config: HttpPriceFeedConfig = config.clone().try_into().map_err(|e| {
				PriceFeedError::Configuration(format!("Invalid http config: {}", e))
			})?;

			Ok(Box::new(HttpPriceFeed::new(http_config)?))
		}
	}
}

impl PriceFeedRegistry for Registry {}
