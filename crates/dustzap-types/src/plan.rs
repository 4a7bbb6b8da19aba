//! Fee and batch plans.
//!
//! Both plans are rebuilt from scratch for every conversion attempt and are
//! never mutated once produced.

use crate::Operation;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Protocol fee charged for one conversion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeePlan {
	/// Wrap and transfer operations that move the fee, in execution order.
	pub fee_operations: Vec<Operation>,
	/// Fee amount in wei.
	pub fee_amount_native: U256,
	/// Fee amount in USD.
	pub fee_usd: f64,
	/// Referrer that receives a share of the fee, if any.
	pub referrer: Option<Address>,
}

impl FeePlan {
	/// A plan that charges nothing.
	pub fn empty() -> Self {
		Self {
			fee_operations: Vec::new(),
			fee_amount_native: U256::ZERO,
			fee_usd: 0.0,
			referrer: None,
		}
	}

	/// Returns true when no fee operations will be submitted.
	pub fn is_empty(&self) -> bool {
		self.fee_operations.is_empty()
	}
}

/// Operations split into execution batches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchPlan {
	/// Batches in submission order. Only the last one may be shorter than the batch size.
	pub batches: Vec<Vec<Operation>>,
	/// 1-indexed batch carrying the first fee operation. Used for labeling only.
	pub fee_batch_index: Option<usize>,
}

impl BatchPlan {
	/// Number of batches in the plan.
	pub fn total_batches(&self) -> usize {
		self.batches.len()
	}

	/// Number of operations across all batches.
	pub fn total_operations(&self) -> usize {
		self.batches.iter().map(Vec::len).sum()
	}

	/// Returns true when there is nothing to submit.
	pub fn is_empty(&self) -> bool {
		self.total_operations() == 0
	}

	/// All operations in submission order.
	pub fn flatten(&self) -> Vec<Operation> {
		self.batches.iter().flatten().cloned().collect()
	}

	/// Returns true if the given 1-indexed batch carries the fee operations.
	pub fn is_fee_batch(&self, batch_index: usize) -> bool {
		self.fee_batch_index == Some(batch_index)
	}
}
