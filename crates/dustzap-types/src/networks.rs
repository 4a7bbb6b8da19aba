//! Network configuration types.
//!
//! Each supported chain declares its wrapped native token (used to move the
//! protocol fee) and the block explorer linked from notifications.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Configuration for a single blockchain network.
///
/// # Fields
///
/// * `name` - Human readable chain name (e.g. "base")
/// * `wrapped_native_address` - WETH (or equivalent) contract on this chain
/// * `explorer_url` - Block explorer root used to build transaction links
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub name: String,
	pub wrapped_native_address: Address,
	pub explorer_url: String,
}

/// Networks configuration mapping chain IDs to their configurations.
pub type NetworksConfig = HashMap<u64, NetworkConfig>;

/// Chain details needed while building and labeling a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
	pub chain_id: u64,
	pub name: String,
	pub wrapped_native_address: Address,
	pub explorer_url: String,
}

impl ChainMetadata {
	/// Builds chain metadata from a configured network.
	pub fn from_network(chain_id: u64, network: &NetworkConfig) -> Self {
		Self {
			chain_id,
			name: network.name.clone(),
			wrapped_native_address: network.wrapped_native_address,
			explorer_url: network.explorer_url.trim_end_matches('/').to_string(),
		}
	}

	/// Explorer link for a transaction hash.
	pub fn tx_url(&self, tx_hash: &str) -> String {
		format!("{}/tx/{}", self.explorer_url, tx_hash)
	}
}

/// Deserializes network configurations keyed by chain ID strings.
///
/// TOML tables only allow string keys, so chain IDs arrive as strings and
/// are parsed into `u64` here.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
