//! EIP-5792 wallet execution over JSON-RPC.
//!
//! Calls are submitted with `wallet_sendCalls` and tracked with
//! `wallet_getCallsStatus` until the wallet reports a terminal status code.
//! Codes below 200 are pending, 200 means every call landed, and 400 or
//! above means the bundle failed off-chain or reverted.

use crate::{
	BatchTransactionInterface, DeliveryError, ExecutionProvider, ExecutionProviderFactory,
	ExecutionProviderRegistry, SendCallsInterface,
};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_transport_http::Http;
use async_trait::async_trait;
use dustzap_types::{
	Address, CallsRequest, ConfigSchema, Field, FieldType, ImplementationRegistry, Operation,
	Schema, SubmissionReceipt, ValidationError,
	truncate_id,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CALLS_VERSION: &str = "2.0.0";
const STATUS_CONFIRMED: u64 = 200;
const STATUS_FAILED: u64 = 400;

type HttpProvider = Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>;

/// JSON shape of a single call in `wallet_sendCalls`.
#[derive(Debug, Clone, Serialize)]
struct WalletCall {
	to: Address,
	value: String,
	data: String,
}

impl From<&Operation> for WalletCall {
	fn from(op: &Operation) -> Self {
		Self {
			to: op.to,
			value: format!("{:#x}", op.value),
			data: op.data.to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendCallsParams {
	version: &'static str,
	chain_id: String,
	from: Address,
	atomic_required: bool,
	calls: Vec<WalletCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsStatus {
	status: u64,
	#[serde(default)]
	receipts: Vec<CallReceipt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallReceipt {
	transaction_hash: String,
}

/// Wallet JSON-RPC backend supporting several chains.
pub struct WalletRpcExecution {
	providers: HashMap<u64, HttpProvider>,
	poll_interval: Duration,
	timeout: Duration,
}

impl WalletRpcExecution {
	pub fn new(
		endpoints: &HashMap<u64, String>,
		poll_interval: Duration,
		timeout: Duration,
	) -> Result<Self, DeliveryError> {
		if endpoints.is_empty() {
			return Err(DeliveryError::Configuration(
				"At least one endpoint must be specified".to_string(),
			));
		}

		let mut providers = HashMap::new();
		for (chain_id, endpoint) in endpoints {
			let url: reqwest::Url = endpoint.parse().map_err(|e| {
				DeliveryError::Configuration(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
			})?;
			let provider = ProviderBuilder::new().on_http(url);
			providers.insert(*chain_id, Arc::new(provider) as HttpProvider);
		}

		Ok(Self {
			providers,
			poll_interval,
			timeout,
		})
	}

	fn get_provider(&self, chain_id: u64) -> Result<&HttpProvider, DeliveryError> {
		self.providers.get(&chain_id).ok_or_else(|| {
			DeliveryError::Configuration(format!("No endpoint configured for chain ID {}", chain_id))
		})
	}

	async fn submit(
		&self,
		chain_id: u64,
		from: Address,
		calls: &[Operation],
		atomic_required: bool,
	) -> Result<SubmissionReceipt, DeliveryError> {
		let provider = self.get_provider(chain_id)?;
		let params = SendCallsParams {
			version: CALLS_VERSION,
			chain_id: format!("{:#x}", chain_id),
			from,
			atomic_required,
			calls: calls.iter().map(WalletCall::from).collect(),
		};
		let params = serde_json::to_value(params)
			.map_err(|e| DeliveryError::Network(format!("Failed to encode calls: {}", e)))?;

		let response: Value = provider
			.client()
			.request("wallet_sendCalls", vec![params])
			.await
			.map_err(|e| DeliveryError::TransactionFailed(format!("wallet_sendCalls failed: {}", e)))?;
		let id = parse_calls_id(&response)?;
		tracing::info!(chain_id, calls_id = %truncate_id(&id), calls = calls.len(), atomic_required, "Submitted calls");

		let transaction_hash = self.wait_for_status(provider, &id).await?;
		Ok(SubmissionReceipt {
			id,
			transaction_hash,
		})
	}

	/// Polls `wallet_getCallsStatus` until the bundle settles.
	async fn wait_for_status(
		&self,
		provider: &HttpProvider,
		id: &str,
	) -> Result<Option<String>, DeliveryError> {
		let start_time = tokio::time::Instant::now();

		loop {
			if start_time.elapsed() > self.timeout {
				return Err(DeliveryError::Timeout {
					id: id.to_string(),
					seconds: self.timeout.as_secs(),
				});
			}

			let status: CallsStatus = provider
				.client()
				.request("wallet_getCallsStatus", vec![id.to_string()])
				.await
				.map_err(|e| DeliveryError::Network(format!("wallet_getCallsStatus failed: {}", e)))?;

			match classify(&status) {
				Some(result) => return result,
				None => {
					tracing::debug!(calls_id = %truncate_id(id), status = status.status, "Calls pending");
					tokio::time::sleep(self.poll_interval).await;
				},
			}
		}
	}
}

/// Reads the bundle id from a v2 `{ id }` object or a bare v1 string.
fn parse_calls_id(response: &Value) -> Result<String, DeliveryError> {
	response
		.as_str()
		.or_else(|| response.get("id").and_then(Value::as_str))
		.map(str::to_string)
		.ok_or_else(|| {
			DeliveryError::TransactionFailed(format!("Unexpected wallet_sendCalls response: {}", response))
		})
}

/// Maps a status to a terminal result, or `None` while pending.
fn classify(status: &CallsStatus) -> Option<Result<Option<String>, DeliveryError>> {
	if status.status >= STATUS_FAILED {
		return Some(Err(DeliveryError::TransactionFailed(format!(
			"Calls failed with status {}",
			status.status
		))));
	}
	if status.status == STATUS_CONFIRMED {
		let hash = status.receipts.last().map(|r| r.transaction_hash.clone());
		return Some(Ok(hash));
	}
	None
}

#[async_trait]
impl SendCallsInterface for WalletRpcExecution {
	async fn send_calls(&self, request: CallsRequest) -> Result<SubmissionReceipt, DeliveryError> {
		self.submit(request.chain_id, request.from, &request.calls, request.atomic_required)
			.await
	}
}

#[async_trait]
impl BatchTransactionInterface for WalletRpcExecution {
	async fn send_batch(
		&self,
		chain_id: u64,
		from: Address,
		calls: Vec<Operation>,
	) -> Result<SubmissionReceipt, DeliveryError> {
		self.submit(chain_id, from, &calls, true).await
	}
}

/// Configuration schema for the wallet RPC backend.
pub struct WalletRpcSchema;

impl ConfigSchema for WalletRpcSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"endpoints",
				FieldType::Table(Schema::new(vec![], vec![])),
			)
			.with_validator(|value| {
				let table = value
					.as_table()
					.ok_or_else(|| "endpoints must be a table".to_string())?;
				if table.is_empty() {
					return Err("endpoints cannot be empty".to_string());
				}
				for (key, val) in table {
					if key.parse::<u64>().is_err() {
						return Err(format!("Invalid chain ID in endpoints: {}", key));
					}
					if !val.is_str() {
						return Err(format!("Endpoint for chain {} must be a string", key));
					}
				}
				Ok(())
			})],
			vec![
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(100),
						max: None,
					},
				),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(3600),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the wallet RPC execution provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "wallet_rpc";
	type Factory = ExecutionProviderFactory;

	fn factory() -> Self::Factory {
		create_wallet_rpc
	}
}

impl ExecutionProviderRegistry for Registry {}

/// Builds the wallet RPC backend from its configuration table.
///
/// # Parameters
/// - `endpoints` (required): chain ID to wallet RPC URL
/// - `poll_interval_ms` (optional, default 1000)
/// - `timeout_seconds` (optional, default 300)
pub fn create_wallet_rpc(config: &toml::Value) -> Result<ExecutionProvider, DeliveryError> {
	WalletRpcSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid configuration: {}", e)))?;

	let endpoints = config
		.get("endpoints")
		.and_then(|v| v.as_table())
		.map(|table| {
			table
				.iter()
				.filter_map(|(key, value)| {
					Some((key.parse::<u64>().ok()?, value.as_str()?.to_string()))
				})
				.collect::<HashMap<_, _>>()
		})
		.ok_or_else(|| DeliveryError::Configuration("endpoints is required".to_string()))?;

	let poll_interval_ms = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(1000) as u64;
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(300) as u64;

	let backend = WalletRpcExecution::new(
		&endpoints,
		Duration::from_millis(poll_interval_ms),
		Duration::from_secs(timeout_seconds),
	)?;
	Ok(ExecutionProvider::from_shared(Arc::new(backend)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use dustzap_types::U256;

	fn parse(input: &str) -> toml::Value {
		toml::Value::Table(toml::from_str(input).unwrap())
	}

	#[test]
	fn test_send_calls_params_shape() {
		let op = Operation::new(Address::repeat_byte(0x42), U256::from(255u64), vec![0xd0, 0xe3]);
		let params = SendCallsParams {
			version: CALLS_VERSION,
			chain_id: format!("{:#x}", 8453u64),
			from: Address::ZERO,
			atomic_required: false,
			calls: vec![WalletCall::from(&op)],
		};
		let json = serde_json::to_value(params).unwrap();

		assert_eq!(json["version"], "2.0.0");
		assert_eq!(json["chainId"], "0x2105");
		assert_eq!(json["atomicRequired"], false);
		assert_eq!(json["calls"][0]["value"], "0xff");
		assert_eq!(json["calls"][0]["data"], "0xd0e3");
	}

	#[test]
	fn test_parse_calls_id_versions() {
		assert_eq!(parse_calls_id(&serde_json::json!("0xabc")).unwrap(), "0xabc");
		assert_eq!(parse_calls_id(&serde_json::json!({"id": "0xdef"})).unwrap(), "0xdef");
		assert!(parse_calls_id(&serde_json::json!({"other": 1})).is_err());
	}

	#[test]
	fn test_status_classification() {
		let pending: CallsStatus = serde_json::from_value(serde_json::json!({"status": 100})).unwrap();
		assert!(classify(&pending).is_none());

		let confirmed: CallsStatus = serde_json::from_value(serde_json::json!({
			"status": 200,
			"receipts": [{"transactionHash": "0x01"}, {"transactionHash": "0x02"}]
		}))
		.unwrap();
		assert_eq!(classify(&confirmed).unwrap().unwrap(), Some("0x02".to_string()));

		let reverted: CallsStatus = serde_json::from_value(serde_json::json!({"status": 500})).unwrap();
		assert!(classify(&reverted).unwrap().is_err());
	}

	#[test]
	fn test_schema_rejects_bad_endpoints() {
		assert!(WalletRpcSchema.validate(&parse("[endpoints]")).is_err());
		assert!(WalletRpcSchema
			.validate(&parse("[endpoints]\nmainnet = \"http://localhost:8545\""))
			.is_err());
		assert!(WalletRpcSchema
			.validate(&parse("[endpoints]\n8453 = \"http://localhost:8545\""))
			.is_ok());
	}

	#[tokio::test]
	async fn test_factory_builds_provider() {
		let config = parse("poll_interval_ms = 250\n[endpoints]\n8453 = \"http://localhost:8545\"");
		assert!(create_wallet_rpc(&config).is_ok());
	}
}
