//! Builder for constructing conversion coordinators.
//!
//! Composes a [`ConversionCoordinator`] from the configured price feed, route
//! service and execution provider using factory functions keyed by
//! implementation name. Only the primary implementation of each component is
//! kept, but every configured implementation is instantiated so invalid
//! configuration fails at startup.

use crate::coordinator::{ConversionCoordinator, CoordinatorSettings};
use crate::event_bus::EventBus;
use crate::fees::FeeCalculator;
use crate::planner::BatchPlanner;
use dustzap_config::Config;
use dustzap_delivery::{DeliveryError, ExecutionProvider};
use dustzap_price::{PriceFeedError, PriceFeedInterface, PriceFeedService};
use dustzap_routes::{RouteError, RouteService, RouteServiceInterface};
use dustzap_sdk::{AuditSink, HttpSdkClient, ReferrerLookup};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during coordinator construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct DustZapFactories<PF, RF, EF> {
	pub price_factories: HashMap<String, PF>,
	pub route_factories: HashMap<String, RF>,
	pub execution_factories: HashMap<String, EF>,
}

/// Builder for constructing a ConversionCoordinator with pluggable implementations.
pub struct CoordinatorBuilder {
	config: Config,
	referrers: Option<Arc<dyn ReferrerLookup>>,
	audit: Option<Arc<dyn AuditSink>>,
}

impl CoordinatorBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			referrers: None,
			audit: None,
		}
	}

	/// Replaces the SDK API client used for referrer lookups and audit messages.
	pub fn with_sdk(mut self, referrers: Arc<dyn ReferrerLookup>, audit: Arc<dyn AuditSink>) -> Self {
		self.referrers = Some(referrers);
		self.audit = Some(audit);
		self
	}

	/// Builds the coordinator using factories for each component type.
	pub fn build<PF, RF, EF>(
		self,
		factories: DustZapFactories<PF, RF, EF>,
	) -> Result<ConversionCoordinator, BuilderError>
	where
		PF: Fn(&toml::Value) -> Result<Box<dyn PriceFeedInterface>, PriceFeedError>,
		RF: Fn(&toml::Value) -> Result<Box<dyn RouteServiceInterface>, RouteError>,
		EF: Fn(&toml::Value) -> Result<ExecutionProvider, DeliveryError>,
	{
		let config = &self.config;

		let price_feed = load_primary(
			"price",
			&config.price.primary,
			&config.price.implementations,
			&factories.price_factories,
		)?;
		let route_service = load_primary(
			"routes",
			&config.routes.primary,
			&config.routes.implementations,
			&factories.route_factories,
		)?;
		let execution = load_primary(
			"execution",
			&config.execution.primary,
			&config.execution.implementations,
			&factories.execution_factories,
		)?;
		tracing::info!(mode = %config.execution.mode, "Execution mode");

		let (referrers, audit) = match (self.referrers, self.audit) {
			(Some(referrers), Some(audit)) => (referrers, audit),
			_ => {
				let client = HttpSdkClient::new(
					config.sdk.base_url.clone(),
					Duration::from_secs(config.sdk.timeout_seconds),
				)
				.map_err(|e| BuilderError::Config(format!("Failed to create SDK client: {}", e)))?;
				let client = Arc::new(client);
				let referrers: Arc<dyn ReferrerLookup> = client.clone();
				let audit: Arc<dyn AuditSink> = client;
				(referrers, audit)
			},
		};

		let planner = BatchPlanner::new(config.engine.batch_size)
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let fees = FeeCalculator::new(&config.engine, referrers);
		let events = EventBus::new(config.engine.event_capacity);

		Ok(ConversionCoordinator::new(
			CoordinatorSettings::from_config(config),
			PriceFeedService::new(Arc::from(price_feed)),
			RouteService::new(Arc::from(route_service)),
			fees,
			planner,
			execution,
			audit,
			events,
		))
	}
}

/// Instantiates every configured implementation of a component and returns the primary.
fn load_primary<F, T, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	F: Fn(&toml::Value) -> Result<T, E>,
	E: Display,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use dustzap_sdk::SdkError;
	use dustzap_types::{Address, ConversionPhase, ConversionRequest, ExecutionMode, TokenBalance};
	use std::str::FromStr;

	struct NoReferrers;

	#[async_trait]
	impl ReferrerLookup for NoReferrers {
		async fn referrer_of(&self, _account: Address) -> Result<Option<Address>, SdkError> {
			Ok(None)
		}
	}

	struct NullAudit;

	#[async_trait]
	impl AuditSink for NullAudit {
		async fn record(&self, _message: String) -> Result<(), SdkError> {
			Ok(())
		}
	}

	const CONFIG: &str = r#"
[engine]
batch_size = 4

[networks.8453]
name = "base"
wrapped_native_address = "0x4200000000000000000000000000000000000006"
explorer_url = "https://basescan.org"

[sdk]
base_url = "https://sdk.example.com"

[price]
primary = "mock"
[price.implementations.mock]
eth_price_usd = 2500.0

[routes]
primary = "mock"
[routes.implementations.mock]

[execution]
mode = "atomic"
primary = "mock"
[execution.implementations.mock]
"#;

	fn factories() -> DustZapFactories<
		dustzap_price::PriceFeedFactory,
		dustzap_routes::RouteServiceFactory,
		dustzap_delivery::ExecutionProviderFactory,
	> {
		DustZapFactories {
			price_factories: dustzap_price::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			route_factories: dustzap_routes::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			execution_factories: dustzap_delivery::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_builds_coordinator_from_config() {
		let config = Config::from_str(CONFIG).unwrap();
		let coordinator = CoordinatorBuilder::new(config)
			.with_sdk(Arc::new(NoReferrers), Arc::new(NullAudit))
			.build(factories())
			.unwrap();
		assert_eq!(coordinator.execution_mode(), ExecutionMode::Atomic);

		let request = ConversionRequest {
			tokens: vec![TokenBalance {
				id: "pepe".to_string(),
				symbol: "PEPE".to_string(),
				optimized_symbol: None,
				address: Some(Address::repeat_byte(0x11)),
				amount: 1000.0,
				price: 0.01,
			}],
			chain_id: 8453,
			account: Address::repeat_byte(0xaa),
			slippage: Some(1.0),
		};
		let result = coordinator.start(request).await.unwrap();
		assert_eq!(result.succeeded_batches, 1);
		assert_eq!(coordinator.snapshot().phase, ConversionPhase::Succeeded);
	}

	#[test]
	fn test_missing_primary_factory_fails() {
		let config = Config::from_str(CONFIG).unwrap();
		let mut factories = factories();
		factories.route_factories.clear();

		let err = CoordinatorBuilder::new(config)
			.with_sdk(Arc::new(NoReferrers), Arc::new(NullAudit))
			.build(factories)
			.err()
			.unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(_)));
	}

	#[test]
	fn test_invalid_implementation_config_fails() {
		let config = Config::from_str(&CONFIG.replace("eth_price_usd = 2500.0", "eth_price_usd = -1.0"))
			.unwrap();

		let err = CoordinatorBuilder::new(config)
			.with_sdk(Arc::new(NoReferrers), Arc::new(NullAudit))
			.build(factories())
			.err()
			.unwrap();
		assert!(err.to_string().contains("price"));
	}
}
