//! Wallet execution for the DustZap conversion engine.
//!
//! Wallets expose two submission primitives. Externally-owned accounts take
//! one batch of calls at a time through the sequential-call primitive;
//! account-abstraction wallets take every call at once as a single atomic
//! bundle. [`ExecutionStrategy`] hides that difference behind a stream of
//! per-batch outcomes.

use async_trait::async_trait;
use dustzap_types::{
	Address, CallsRequest, ExecutionMode, ImplementationRegistry, Operation, SubmissionReceipt,
};
use std::sync::Arc;
use thiserror::Error;

mod strategy;

pub use strategy::{BatchOutcome, ExecutionStrategy};

pub mod implementations {
	pub mod evm {
		pub mod wallet_rpc;
	}
	pub mod mock;
}

/// Errors that can occur while submitting calls to a wallet.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The wallet rejected or failed to execute the calls.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// The calls did not reach a terminal status in time.
	#[error("Timed out waiting for calls {id} after {seconds}s")]
	Timeout { id: String, seconds: u64 },
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Sequential-call primitive used by externally-owned accounts.
#[async_trait]
pub trait SendCallsInterface: Send + Sync {
	/// Submits one batch and resolves once the wallet reports it settled.
	async fn send_calls(&self, request: CallsRequest) -> Result<SubmissionReceipt, DeliveryError>;
}

/// Atomic-batch primitive used by account-abstraction wallets.
#[async_trait]
pub trait BatchTransactionInterface: Send + Sync {
	/// Submits every call as one atomic bundle.
	async fn send_batch(
		&self,
		chain_id: u64,
		from: Address,
		calls: Vec<Operation>,
	) -> Result<SubmissionReceipt, DeliveryError>;
}

/// A configured wallet backend exposing both submission primitives.
#[derive(Clone)]
pub struct ExecutionProvider {
	pub sequential: Arc<dyn SendCallsInterface>,
	pub atomic: Arc<dyn BatchTransactionInterface>,
}

impl ExecutionProvider {
	/// Wraps a backend that implements both primitives.
	pub fn from_shared<T>(backend: Arc<T>) -> Self
	where
		T: SendCallsInterface + BatchTransactionInterface + 'static,
	{
		Self {
			sequential: backend.clone(),
			atomic: backend,
		}
	}

	/// Strategy for the given wallet mode.
	pub fn strategy(&self, mode: ExecutionMode) -> ExecutionStrategy {
		match mode {
			ExecutionMode::Sequential => ExecutionStrategy::Sequential(self.sequential.clone()),
			ExecutionMode::Atomic => ExecutionStrategy::Atomic(self.atomic.clone()),
		}
	}
}

/// Type alias for execution provider factory functions.
pub type ExecutionProviderFactory = fn(&toml::Value) -> Result<ExecutionProvider, DeliveryError>;

/// Registry trait for execution provider implementations.
pub trait ExecutionProviderRegistry:
	ImplementationRegistry<Factory = ExecutionProviderFactory>
{
}

/// Get all registered execution provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ExecutionProviderFactory)> {
	use implementations::{evm::wallet_rpc, mock};

	vec![
		(wallet_rpc::Registry::NAME, wallet_rpc::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}
