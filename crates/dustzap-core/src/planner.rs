//! Batch planning.
//!
//! Wallets cap the number of calls per submission, so the combined list of
//! swap and fee operations is cut into fixed-size batches. Fee operations
//! are spliced in as one contiguous block near the start of the run
//! (batch 2, or about a third of the way into long runs) instead of being
//! appended to the last batch.

use dustzap_types::{BatchPlan, Operation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
	#[error("Batch size must be at least 1")]
	InvalidBatchSize,
	#[error("Planned {actual} operations but expected {expected}")]
	CountMismatch { expected: usize, actual: usize },
}

/// 1-indexed batch that should carry the fee operations.
pub fn choose_fee_insertion_batch(total_batches: usize) -> usize {
	match total_batches {
		0 | 1 => 1,
		2..=4 => 2,
		n => ((n as f64 * 0.33).ceil() as usize).max(2),
	}
}

/// Splits operations into batches of at most `batch_size` calls.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
	batch_size: usize,
}

impl BatchPlanner {
	pub fn new(batch_size: usize) -> Result<Self, PlanError> {
		if batch_size == 0 {
			return Err(PlanError::InvalidBatchSize);
		}
		Ok(Self { batch_size })
	}

	pub fn batch_size(&self) -> usize {
		self.batch_size
	}

	/// Interleaves fee operations into the swap operations and batches them.
	///
	/// Swap order is preserved, fee operations stay contiguous, and every
	/// batch but the last holds exactly `batch_size` operations.
	pub fn plan(
		&self,
		conversion_ops: Vec<Operation>,
		fee_ops: Vec<Operation>,
	) -> Result<BatchPlan, PlanError> {
		let size = self.batch_size;
		let expected = conversion_ops.len() + fee_ops.len();
		let fee_count = fee_ops.len();
		let dust_batches = conversion_ops.len().div_ceil(size);

		let mut combined = conversion_ops;
		let fee_start = if dust_batches <= 1 || fee_ops.is_empty() {
			let start = combined.len();
			combined.extend(fee_ops);
			start
		} else {
			let insert_at = ((choose_fee_insertion_batch(dust_batches) - 1) * size).min(combined.len());
			let tail = combined.split_off(insert_at);
			combined.extend(fee_ops);
			combined.extend(tail);
			insert_at
		};

		if combined.len() != expected {
			return Err(PlanError::CountMismatch {
				expected,
				actual: combined.len(),
			});
		}

		let fee_batch_index = (fee_count > 0).then(|| fee_start / size + 1);
		let mut batches = Vec::with_capacity(combined.len().div_ceil(size));
		let mut remaining = combined.into_iter().peekable();
		while remaining.peek().is_some() {
			batches.push(remaining.by_ref().take(size).collect());
		}

		tracing::debug!(
			operations = expected,
			batches = batches.len(),
			fee_batch_index = ?fee_batch_index,
			"Planned batches"
		);
		Ok(BatchPlan {
			batches,
			fee_batch_index,
		})
	}
}
