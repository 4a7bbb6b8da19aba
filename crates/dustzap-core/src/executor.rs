//! Batch execution.
//!
//! Drives an [`ExecutionStrategy`] over a plan and reports each batch to
//! [`BatchCallbacks`] before the next one is submitted. The first failed
//! batch ends the run; batches that already landed stay valid.

use dustzap_delivery::{DeliveryError, ExecutionStrategy};
use dustzap_types::{truncate_id, Address, BatchPlan, BatchProgress, SubmissionReceipt};
use futures::StreamExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
	#[error("Batch {batch_index} failed: {message}")]
	BatchSubmission { batch_index: usize, message: String },
}

/// Wallet-facing text of a delivery error.
///
/// Rejections carry the wallet's own message, which is shown to the user as is.
pub fn failure_message(error: &DeliveryError) -> String {
	match error {
		DeliveryError::TransactionFailed(message) => message.clone(),
		other => other.to_string(),
	}
}

/// Receives per-batch results while a plan executes.
pub trait BatchCallbacks: Send + Sync {
	/// Called once before the first submission with the number of submissions planned.
	fn on_started(&self, total_batches: usize);
	fn on_success(&self, receipt: &SubmissionReceipt, is_last: bool, batch_index: usize);
	fn on_error(&self, error: &DeliveryError, batch_index: usize);
}

/// Lifecycle of one executor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorState {
	#[default]
	Idle,
	Running,
	Succeeded,
	Failed,
}

/// Summary of a run in which every batch landed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
	pub progress: BatchProgress,
	pub receipts: Vec<SubmissionReceipt>,
	pub last_receipt: Option<SubmissionReceipt>,
}

/// Submits the batches of one attempt on behalf of `from`.
pub struct BatchExecutor {
	chain_id: u64,
	from: Address,
	state: ExecutorState,
}

impl BatchExecutor {
	pub fn new(chain_id: u64, from: Address) -> Self {
		Self {
			chain_id,
			from,
			state: ExecutorState::Idle,
		}
	}

	pub fn state(&self) -> ExecutorState {
		self.state
	}

	pub async fn run(
		&mut self,
		plan: &BatchPlan,
		strategy: &ExecutionStrategy,
		callbacks: &dyn BatchCallbacks,
	) -> Result<ExecutionReport, ExecutionError> {
		let total_batches = strategy.total_batches(plan);
		let mut report = ExecutionReport {
			progress: BatchProgress::new(total_batches),
			..Default::default()
		};

		self.state = ExecutorState::Running;
		tracing::info!(
			mode = %strategy.mode(),
			total_batches,
			operations = plan.total_operations(),
			"Executing conversion"
		);
		callbacks.on_started(total_batches);

		let mut outcomes = strategy.submit(self.chain_id, self.from, plan);
		while let Some(outcome) = outcomes.next().await {
			let batch_index = outcome.batch_index;
			let is_last = outcome.is_last();
			match outcome.result {
				Ok(receipt) => {
					report.progress.complete(batch_index);
					tracing::info!(
						batch_index,
						total_batches,
						tx_hash = %truncate_id(receipt.transaction_hash.as_deref().unwrap_or(&receipt.id)),
						"Batch confirmed"
					);
					callbacks.on_success(&receipt, is_last, batch_index);
					report.last_receipt = Some(receipt.clone());
					report.receipts.push(receipt);
				},
				Err(error) => {
					tracing::warn!(batch_index, total_batches, error = %error, "Batch failed");
					callbacks.on_error(&error, batch_index);
					self.state = ExecutorState::Failed;
					return Err(ExecutionError::BatchSubmission {
						batch_index,
						message: failure_message(&error),
					});
				},
			}
		}

		self.state = ExecutorState::Succeeded;
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dustzap_delivery::implementations::mock::{MockExecutionConfig, MockExecutionProvider};
	use dustzap_types::Operation;
	use mockall::{mock, predicate::eq, Sequence};
	use std::sync::Arc;

	mock! {
		pub Callbacks {}
		impl BatchCallbacks for Callbacks {
			fn on_started(&self, total_batches: usize);
			fn on_success(&self, receipt: &SubmissionReceipt, is_last: bool, batch_index: usize);
			fn on_error(&self, error: &DeliveryError, batch_index: usize);
		}
	}

	fn plan(batches: usize) -> BatchPlan {
		BatchPlan {
			batches: (0..batches)
				.map(|i| vec![Operation::call(Address::repeat_byte(i as u8 + 1), Vec::new())])
				.collect(),
			fee_batch_index: None,
		}
	}

	fn provider(fail_at_batch: Option<usize>) -> Arc<MockExecutionProvider> {
		Arc::new(MockExecutionProvider::new(MockExecutionConfig {
			fail_at_batch,
			..Default::default()
		}))
	}

	#[tokio::test]
	async fn test_sequential_partial_failure() {
		let provider = provider(Some(2));
		let strategy = ExecutionStrategy::Sequential(provider.clone());
		let mut callbacks = MockCallbacks::new();
		let mut sequence = Sequence::new();
		callbacks
			.expect_on_started()
			.with(eq(3))
			.times(1)
			.in_sequence(&mut sequence)
			.return_const(());
		callbacks
			.expect_on_success()
			.withf(|_, is_last, batch_index| !*is_last && *batch_index == 1)
			.times(1)
			.in_sequence(&mut sequence)
			.return_const(());
		callbacks
			.expect_on_error()
			.withf(|_, batch_index| *batch_index == 2)
			.times(1)
			.in_sequence(&mut sequence)
			.return_const(());

		let mut executor = BatchExecutor::new(8453, Address::ZERO);
		let result = executor.run(&plan(3), &strategy, &callbacks).await;

		assert!(matches!(
			result,
			Err(ExecutionError::BatchSubmission { batch_index: 2, .. })
		));
		assert_eq!(executor.state(), ExecutorState::Failed);
		assert_eq!(provider.submissions(), 2);
	}

	#[tokio::test]
	async fn test_sequential_success_reports_every_batch() {
		let strategy = ExecutionStrategy::Sequential(provider(None));
		let mut callbacks = MockCallbacks::new();
		callbacks.expect_on_started().return_const(());
		callbacks
			.expect_on_success()
			.withf(|_, is_last, batch_index| *is_last == (*batch_index == 3))
			.times(3)
			.return_const(());
		callbacks.expect_on_error().never();

		let mut executor = BatchExecutor::new(8453, Address::ZERO);
		let report = executor.run(&plan(3), &strategy, &callbacks).await.unwrap();

		assert_eq!(report.progress, BatchProgress { completed: 3, total: 3 });
		assert_eq!(report.receipts.len(), 3);
		assert_eq!(report.last_receipt, report.receipts.last().cloned());
		assert_eq!(executor.state(), ExecutorState::Succeeded);
	}

	#[tokio::test]
	async fn test_atomic_fires_exactly_one_callback() {
		let strategy = ExecutionStrategy::Atomic(provider(None));
		let mut callbacks = MockCallbacks::new();
		callbacks.expect_on_started().with(eq(1)).times(1).return_const(());
		callbacks
			.expect_on_success()
			.withf(|_, is_last, batch_index| *is_last && *batch_index == 1)
			.times(1)
			.return_const(());
		callbacks.expect_on_error().never();

		let mut executor = BatchExecutor::new(8453, Address::ZERO);
		let report = executor.run(&plan(3), &strategy, &callbacks).await.unwrap();

		assert_eq!(report.progress, BatchProgress { completed: 1, total: 1 });
	}

	#[tokio::test]
	async fn test_atomic_failure_reports_batch_one() {
		let strategy = ExecutionStrategy::Atomic(provider(Some(1)));
		let mut callbacks = MockCallbacks::new();
		callbacks.expect_on_started().return_const(());
		callbacks.expect_on_success().never();
		callbacks
			.expect_on_error()
			.withf(|_, batch_index| *batch_index == 1)
			.times(1)
			.return_const(());

		let mut executor = BatchExecutor::new(8453, Address::ZERO);
		let result = executor.run(&plan(2), &strategy, &callbacks).await;

		assert!(matches!(
			result,
			Err(ExecutionError::BatchSubmission { batch_index: 1, .. })
		));
	}
}
