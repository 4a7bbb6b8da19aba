//! Configuration module for the DustZap conversion engine.
//!
//! Configuration is loaded from TOML. Values may reference environment
//! variables with `${VAR}` or `${VAR:-default}`, and a file can pull in
//! other files with `include = ["networks.toml"]` as long as every
//! top-level section is defined exactly once.

mod loader;

use dustzap_types::{
	networks::deserialize_networks, Address, ChainMetadata, ExecutionMode, NetworksConfig,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default rendering dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Default protocol treasury receiving the non-referral share of fees.
pub const DEFAULT_TREASURY_ADDRESS: &str = "0x2eCBC6f229feD06044CDb0dD772437a30190CD50";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Fee and batching parameters.
	#[serde(default)]
	pub engine: EngineConfig,
	/// Supported chains.
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	/// SDK API used for referrer lookups and the audit webhook.
	pub sdk: SdkConfig,
	/// ETH price feed implementations.
	pub price: ImplementationsConfig,
	/// Swap route service implementations.
	pub routes: ImplementationsConfig,
	/// Wallet execution implementations and mode.
	pub execution: ExecutionConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Fee and batching parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Maximum number of operations per submitted batch.
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	/// Share of the converted USD value charged as protocol fee.
	#[serde(default = "default_fee_rate")]
	pub fee_rate: f64,
	/// Percentage of the fee paid to the referrer, when one exists.
	#[serde(default = "default_referral_fee_percent")]
	pub referral_fee_percent: u8,
	/// Treasury receiving the protocol share of the fee.
	#[serde(default = "default_treasury_address")]
	pub treasury_address: Address,
	/// Slippage used when a request does not specify one.
	#[serde(default = "default_slippage")]
	pub default_slippage: f64,
	/// Capacity of the event bus channel.
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
			fee_rate: default_fee_rate(),
			referral_fee_percent: default_referral_fee_percent(),
			treasury_address: default_treasury_address(),
			default_slippage: default_slippage(),
			event_capacity: default_event_capacity(),
		}
	}
}

fn default_batch_size() -> usize {
	10
}

fn default_fee_rate() -> f64 {
	0.0001 // 0.01%
}

fn default_referral_fee_percent() -> u8 {
	70
}

fn default_treasury_address() -> Address {
	Address::from_str(DEFAULT_TREASURY_ADDRESS).unwrap_or_default()
}

fn default_slippage() -> f64 {
	49.0
}

fn default_event_capacity() -> usize {
	256
}

/// SDK API client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SdkConfig {
	/// Base URL of the SDK API (no trailing slash needed).
	pub base_url: String,
	/// Request timeout in seconds.
	#[serde(default = "default_sdk_timeout")]
	pub timeout_seconds: u64,
}

fn default_sdk_timeout() -> u64 {
	10
}

/// A set of named implementations with one selected as primary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplementationsConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of implementation names to their raw configuration.
	pub implementations: HashMap<String, toml::Value>,
}

impl ImplementationsConfig {
	/// Raw configuration of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// Wallet execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
	/// Sequential calls for EOAs, one atomic bundle for smart accounts.
	#[serde(default)]
	pub mode: ExecutionMode,
	/// Which implementation to use.
	pub primary: String,
	/// Map of implementation names to their raw configuration.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports
/// defaults with `${VAR_NAME:-default_value}`. Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Metadata for a configured chain.
	pub fn chain(&self, chain_id: u64) -> Option<ChainMetadata> {
		self.networks
			.get(&chain_id)
			.map(|network| ChainMetadata::from_network(chain_id, network))
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		let engine = &self.engine;
		if engine.batch_size == 0 {
			return Err(ConfigError::Validation(
				"engine.batch_size must be at least 1".into(),
			));
		}
		if !engine.fee_rate.is_finite() || engine.fee_rate < 0.0 || engine.fee_rate >= 1.0 {
			return Err(ConfigError::Validation(format!(
				"engine.fee_rate must be within [0, 1), got {}",
				engine.fee_rate
			)));
		}
		if engine.referral_fee_percent > 100 {
			return Err(ConfigError::Validation(format!(
				"engine.referral_fee_percent cannot exceed 100, got {}",
				engine.referral_fee_percent
			)));
		}
		if !(0.0..=100.0).contains(&engine.default_slippage) {
			return Err(ConfigError::Validation(format!(
				"engine.default_slippage must be within [0, 100], got {}",
				engine.default_slippage
			)));
		}
		if engine.event_capacity == 0 {
			return Err(ConfigError::Validation(
				"engine.event_capacity must be at least 1".into(),
			));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"At least one network must be configured".into(),
			));
		}
		for (chain_id, network) in &self.networks {
			if network.explorer_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network {} must have explorer_url",
					chain_id
				)));
			}
			if network.wrapped_native_address.is_zero() {
				return Err(ConfigError::Validation(format!(
					"Network {} must have a non-zero wrapped_native_address",
					chain_id
				)));
			}
		}

		if self.sdk.base_url.is_empty() {
			return Err(ConfigError::Validation("sdk.base_url cannot be empty".into()));
		}

		validate_primary("price", &self.price.primary, &self.price.implementations)?;
		validate_primary("routes", &self.routes.primary, &self.routes.implementations)?;
		validate_primary(
			"execution",
			&self.execution.primary,
			&self.execution.implementations,
		)?;

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("api.port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		tracing::debug!(
			networks = config.networks.len(),
			mode = %config.execution.mode,
			"Configuration validated"
		);
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
[networks.8453]
name = "base"
wrapped_native_address = "0x4200000000000000000000000000000000000006"
explorer_url = "https://basescan.org"

[sdk]
base_url = "${DUSTZAP_TEST_SDK_URL:-https://sdk.example.com}"

[price]
primary = "mock"
[price.implementations.mock]
eth_price_usd = 3000.0

[routes]
primary = "mock"
[routes.implementations.mock]

[execution]
mode = "atomic"
primary = "mock"
[execution.implementations.mock]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("DUSTZAP_TEST_HOST", "localhost");
		std::env::set_var("DUSTZAP_TEST_PORT", "5432");

		let input = "host = \"${DUSTZAP_TEST_HOST}:${DUSTZAP_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("DUSTZAP_TEST_HOST");
		std::env::remove_var("DUSTZAP_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${DUSTZAP_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${DUSTZAP_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.unwrap_err().to_string().contains("DUSTZAP_MISSING_VAR"));
	}

	#[test]
	fn test_parse_with_defaults() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.engine.batch_size, 10);
		assert_eq!(config.engine.fee_rate, 0.0001);
		assert_eq!(config.engine.referral_fee_percent, 70);
		assert_eq!(config.engine.default_slippage, 49.0);
		assert_eq!(
			config.engine.treasury_address,
			Address::from_str(DEFAULT_TREASURY_ADDRESS).unwrap()
		);
		assert_eq!(config.sdk.base_url, "https://sdk.example.com");
		assert_eq!(config.execution.mode, ExecutionMode::Atomic);
		assert!(config.price.primary_config().is_some());

		let chain = config.chain(8453).unwrap();
		assert_eq!(chain.name, "base");
		assert!(config.chain(1).is_none());
	}

	#[test]
	fn test_zero_batch_size_rejected() {
		let input = format!("[engine]\nbatch_size = 0\n{}", BASE_CONFIG);
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("batch_size"));
	}

	#[test]
	fn test_referral_percent_bounds() {
		let input = format!("[engine]\nreferral_fee_percent = 120\n{}", BASE_CONFIG);
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("referral_fee_percent"));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let input = BASE_CONFIG.replace("primary = \"mock\"\n[routes", "primary = \"http\"\n[routes");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary price 'http'"));
	}
}
