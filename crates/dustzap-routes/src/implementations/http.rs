//! Route service client for the swap aggregator API.
//!
//! Posts the [`RouteRequest`] as JSON, ETH price included in its
//! `price_table`, and expects
//! `{ operations, aggregate_trading_loss_usd, steps }` back. Steps are
//! forwarded to the status channel in the order the service returned them.

use crate::{
	forward_status, RouteBundle, RouteError, RouteRequest, RouteServiceFactory,
	RouteServiceInterface, RouteServiceRegistry,
};
use async_trait::async_trait;
use dustzap_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Operation, Schema, StatusMessage,
	ValidationError,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpRouteServiceConfig {
	pub url: String,
	/// Route building touches many DEX aggregators, so the default is generous.
	#[serde(default = "default_timeout")]
	pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
	120
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
	operations: Vec<Operation>,
	#[serde(default)]
	aggregate_trading_loss_usd: f64,
	#[serde(default)]
	steps: Vec<StatusMessage>,
}

pub struct HttpRouteServiceSchema;

impl ConfigSchema for HttpRouteServiceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("url must be an http(s) URL".to_string()),
				}
			})],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(600),
				},
			)],
		);
		schema.validate(config)
	}
}

pub struct HttpRouteService {
	client: reqwest::Client,
	url: String,
}

impl HttpRouteService {
	pub fn new(config: HttpRouteServiceConfig) -> Result<Self, RouteError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_seconds))
			.build()
			.map_err(|e| RouteError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			url: config.url,
		})
	}
}

impl RouteResponse {
	fn into_bundle(self, status: &mpsc::UnboundedSender<StatusMessage>) -> RouteBundle {
		for step in self.steps {
			forward_status(status, step);
		}
		RouteBundle {
			operations: self.operations,
			aggregate_trading_loss_usd: self.aggregate_trading_loss_usd,
		}
	}
}

#[async_trait]
impl RouteServiceInterface for HttpRouteService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpRouteServiceSchema)
	}

	async fn fetch_routes(
		&self,
		request: &RouteRequest,
		status: mpsc::UnboundedSender<StatusMessage>,
	) -> Result<RouteBundle, RouteError> {
		let response = self
			.client
			.post(&self.url)
			.json(request)
			.send()
			.await
			.map_err(|e| RouteError::Network(format!("Route request failed: {}", e)))?;

		if !response.status().is_success() {
			let code = response.status();
			let body = response.text().await.unwrap_or_default();
			return Err(RouteError::InvalidResponse(format!(
				"Route service returned {}: {}",
				code, body
			)));
		}

		let body: RouteResponse = response
			.json()
			.await
			.map_err(|e| RouteError::InvalidResponse(format!("Malformed route response: {}", e)))?;

		Ok(body.into_bundle(&status))
	}
}

/// Registry for the HTTP route service implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = RouteServiceFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn RouteServiceInterface>, RouteError> {
			HttpRouteServiceSchema
				.validate(config)
				.map_err(|e| RouteError::Configuration(e.to_string()))?;
			let http_config: HttpRouteServiceConfig = config.clone().try_into().map_err(|e| {
				RouteError::Configuration(format!("Invalid http config: {}", e))
			})?;
			Ok(Box::new(HttpRouteService::new(http_config)?))
		}
	}
}

impl RouteServiceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_steps_forwarded_in_order() {
		let body = r#"{
			"operations": [
				{"to": "0x1111111111111111111111111111111111111111", "data": "0x01"},
				{"to": "0x2222222222222222222222222222222222222222", "value": "0x0", "data": "0x02"}
			],
			"aggregate_trading_loss_usd": 0.42,
			"steps": [
				{"fromToken": "USDC", "toToken": "ETH", "amount": 1.0, "outputAmount": 0.0003,
				 "tradingLoss": 0.01, "dexAggregator": "1inch", "totalSteps": 2},
				{"fromToken": "DAI", "toToken": "ETH", "amount": 2.0, "outputAmount": 0.0006,
				 "tradingLoss": 0.02, "dexAggregator": "odos"}
			]
		}"#;
		let response: RouteResponse = serde_json::from_str(body).unwrap();
		let (tx, mut rx) = mpsc::unbounded_channel();

		let bundle = response.into_bundle(&tx);

		assert_eq!(bundle.operations.len(), 2);
		assert_eq!(bundle.aggregate_trading_loss_usd, 0.42);
		assert_eq!(rx.recv().await.unwrap().dex_aggregator, "1inch");
		assert_eq!(rx.recv().await.unwrap().dex_aggregator, "odos");
	}

	#[test]
	fn test_request_body_carries_eth_price() {
		let request = RouteRequest::new(vec![], 8453, alloy_primitives::Address::ZERO, 3100.5, 1.0);

		let body = serde_json::to_value(&request).unwrap();

		assert_eq!(body["price_table"]["eth"], 3100.5);
	}

	#[test]
	fn test_schema_requires_url() {
		let empty = toml::Value::Table(toml::Table::new());
		assert!(Registry::factory()(&empty).is_err());

		let config =
			toml::Value::Table(toml::from_str("url = \"https://routes.example.com/v1\"").unwrap());
		assert!(Registry::factory()(&config).is_ok());
	}
}
