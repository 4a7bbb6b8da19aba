//! In-memory wallet for local development and tests.
//!
//! Every submission settles immediately with a synthetic hash derived from
//! the submission counter. `fail_at_batch` makes the n-th submission fail,
//! which is enough to exercise partial-success handling end to end.

use crate::{
	BatchTransactionInterface, DeliveryError, ExecutionProvider, ExecutionProviderFactory,
	ExecutionProviderRegistry, SendCallsInterface,
};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use dustzap_types::{
	with_0x_prefix, Address, CallsRequest, ConfigSchema, Field, FieldType,
	ImplementationRegistry, Operation, Schema, SubmissionReceipt, ValidationError,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MockExecutionConfig {
	/// 1-indexed submission that fails.
	#[serde(default)]
	pub fail_at_batch: Option<usize>,
	#[serde(default = "default_error_message")]
	pub error_message: String,
	/// Artificial settlement delay per submission.
	#[serde(default)]
	pub latency_ms: u64,
}

fn default_error_message() -> String {
	"User rejected the request".to_string()
}

impl Default for MockExecutionConfig {
	fn default() -> Self {
		Self {
			fail_at_batch: None,
			error_message: default_error_message(),
			latency_ms: 0,
		}
	}
}

pub struct MockExecutionSchema;

impl ConfigSchema for MockExecutionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"fail_at_batch",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("error_message", FieldType::String),
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(60_000),
					},
				),
			],
		);
		schema.validate(config)
	}
}

pub struct MockExecutionProvider {
	config: MockExecutionConfig,
	submissions: AtomicUsize,
	last_call_count: AtomicUsize,
}

impl MockExecutionProvider {
	pub fn new(config: MockExecutionConfig) -> Self {
		Self {
			config,
			submissions: AtomicUsize::new(0),
			last_call_count: AtomicUsize::new(0),
		}
	}

	/// Number of submissions received so far, failed ones included.
	pub fn submissions(&self) -> usize {
		self.submissions.load(Ordering::SeqCst)
	}

	/// Number of calls in the most recent submission.
	pub fn last_call_count(&self) -> usize {
		self.last_call_count.load(Ordering::SeqCst)
	}

	async fn settle(
		&self,
		chain_id: u64,
		from: Address,
		calls: &[Operation],
	) -> Result<SubmissionReceipt, DeliveryError> {
		let index = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
		self.last_call_count.store(calls.len(), Ordering::SeqCst);

		if self.config.latency_ms > 0 {
			tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
		}

		if self.config.fail_at_batch == Some(index) {
			tracing::debug!(submission = index, "Mock wallet failing submission");
			return Err(DeliveryError::TransactionFailed(self.config.error_message.clone()));
		}

		let seed = format!("{}:{}:{}:{}", chain_id, from, index, calls.len());
		let hash = with_0x_prefix(&hex::encode(keccak256(seed.as_bytes())));
		Ok(SubmissionReceipt {
			id: hash.clone(),
			transaction_hash: Some(hash),
		})
	}
}

#[async_trait]
impl SendCallsInterface for MockExecutionProvider {
	async fn send_calls(&self, request: CallsRequest) -> Result<SubmissionReceipt, DeliveryError> {
		self.settle(request.chain_id, request.from, &request.calls).await
	}
}

#[async_trait]
impl BatchTransactionInterface for MockExecutionProvider {
	async fn send_batch(
		&self,
		chain_id: u64,
		from: Address,
		calls: Vec<Operation>,
	) -> Result<SubmissionReceipt, DeliveryError> {
		self.settle(chain_id, from, &calls).await
	}
}

/// Registry for the mock execution provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = ExecutionProviderFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<ExecutionProvider, DeliveryError> {
			MockExecutionSchema
				.validate(config)
				.map_err(|e| DeliveryError::Configuration(e.to_string()))?;
			let mock_config: MockExecutionConfig = config.clone().try_into().map_err(|e| {
				DeliveryError::Configuration(format!("Invalid mock config: {}", e))
			})?;
			Ok(ExecutionProvider::from_shared(Arc::new(
				MockExecutionProvider::new(mock_config),
			)))
		}
	}
}

impl ExecutionProviderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_hashes_are_distinct_per_submission() {
		let provider = MockExecutionProvider::new(MockExecutionConfig::default());
		let first = provider.send_batch(1, Address::ZERO, vec![]).await.unwrap();
		let second = provider.send_batch(1, Address::ZERO, vec![]).await.unwrap();

		assert_ne!(first.id, second.id);
		assert_eq!(first.transaction_hash.as_deref(), Some(first.id.as_str()));
		assert_eq!(first.id.len(), 66);
	}

	#[tokio::test]
	async fn test_configured_failure() {
		let config = toml::Value::Table(
			toml::from_str("fail_at_batch = 1\nerror_message = \"denied\"").unwrap(),
		);
		let provider = Registry::factory()(&config).unwrap();
		let request = CallsRequest {
			chain_id: 1,
			from: Address::ZERO,
			calls: vec![],
			atomic_required: false,
		};

		let err = provider.sequential.send_calls(request).await.unwrap_err();
		assert_eq!(err.to_string(), "Transaction failed: denied");
	}
}
