//! Wallet execution types.
//!
//! This module defines the requests sent to wallet execution providers and
//! the receipts they hand back once a submission settles.

use crate::Operation;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// A batch of calls submitted through the sequential-call primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallsRequest {
	/// Chain the calls execute on.
	pub chain_id: u64,
	/// Account that sends the calls.
	pub from: Address,
	/// Calls in execution order.
	pub calls: Vec<Operation>,
	/// Whether the wallet must execute all calls atomically.
	pub atomic_required: bool,
}

/// Result of a settled submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
	/// Provider-assigned identifier of the submission (bundle id or hash).
	pub id: String,
	/// Hash of the transaction that carried the calls, when known.
	pub transaction_hash: Option<String>,
}

/// How the wallet executes a conversion.
///
/// Chosen from the wallet configuration, never by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
	/// Externally-owned account: batches are sent one after another.
	#[default]
	Sequential,
	/// Account-abstraction wallet: every operation goes out as one atomic bundle.
	Atomic,
}

impl std::fmt::Display for ExecutionMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ExecutionMode::Sequential => write!(f, "sequential"),
			ExecutionMode::Atomic => write!(f, "atomic"),
		}
	}
}
