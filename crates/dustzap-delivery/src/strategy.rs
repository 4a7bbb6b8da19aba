//! Mode-independent batch submission.

use crate::{BatchTransactionInterface, DeliveryError, SendCallsInterface};
use async_stream::stream;
use dustzap_types::{Address, BatchPlan, CallsRequest, ExecutionMode, SubmissionReceipt};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Result of submitting one batch.
#[derive(Debug)]
pub struct BatchOutcome {
	/// 1-indexed batch number.
	pub batch_index: usize,
	/// Number of submissions the strategy makes for the plan.
	pub total_batches: usize,
	pub result: Result<SubmissionReceipt, DeliveryError>,
}

impl BatchOutcome {
	pub fn is_last(&self) -> bool {
		self.batch_index == self.total_batches
	}
}

/// How a plan reaches the wallet, chosen once per attempt.
#[derive(Clone)]
pub enum ExecutionStrategy {
	/// One `send_calls` per batch, in order, each with `atomic_required = false`.
	Sequential(Arc<dyn SendCallsInterface>),
	/// The flattened plan as a single atomic bundle.
	Atomic(Arc<dyn BatchTransactionInterface>),
}

impl ExecutionStrategy {
	pub fn mode(&self) -> ExecutionMode {
		match self {
			ExecutionStrategy::Sequential(_) => ExecutionMode::Sequential,
			ExecutionStrategy::Atomic(_) => ExecutionMode::Atomic,
		}
	}

	/// Number of submissions this strategy makes for `plan`.
	pub fn total_batches(&self, plan: &BatchPlan) -> usize {
		match self {
			ExecutionStrategy::Sequential(_) => plan.total_batches(),
			ExecutionStrategy::Atomic(_) => usize::from(!plan.is_empty()),
		}
	}

	/// Submits `plan` and yields one outcome per submission.
	///
	/// The stream is lazy: the next batch is only sent once the consumer
	/// polls past the previous outcome. A sequential run ends after the
	/// first failed batch.
	pub fn submit<'a>(
		&'a self,
		chain_id: u64,
		from: Address,
		plan: &'a BatchPlan,
	) -> BoxStream<'a, BatchOutcome> {
		let total_batches = self.total_batches(plan);
		match self {
			ExecutionStrategy::Sequential(provider) => Box::pin(stream! {
				for (offset, calls) in plan.batches.iter().enumerate() {
					let batch_index = offset + 1;
					tracing::debug!(batch_index, total_batches, calls = calls.len(), "Submitting batch");
					let request = CallsRequest {
						chain_id,
						from,
						calls: calls.clone(),
						atomic_required: false,
					};
					let result = provider.send_calls(request).await;
					let failed = result.is_err();
					yield BatchOutcome { batch_index, total_batches, result };
					if failed {
						break;
					}
				}
			}),
			ExecutionStrategy::Atomic(provider) => Box::pin(stream! {
				if total_batches > 0 {
					let calls = plan.flatten();
					tracing::debug!(calls = calls.len(), "Submitting atomic bundle");
					let result = provider.send_batch(chain_id, from, calls).await;
					yield BatchOutcome { batch_index: 1, total_batches, result };
				}
			}),
		}
	}
}
