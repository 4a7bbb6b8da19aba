//! Event types published while a conversion attempt runs.
//!
//! The coordinator publishes these events on its event bus. Presentation
//! code subscribes to render notifications, progress and the share modal;
//! it never writes back into engine state.

use crate::{ShareSummary, StatusMessage, SubmissionReceipt};
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
	Success,
	Error,
}

/// A discrete user-facing notification about one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
	pub kind: NotificationKind,
	pub title: String,
	pub description: String,
	/// 1-indexed batch the notification refers to.
	pub batch_index: usize,
}

/// Events emitted by the conversion coordinator.
///
/// Every event carries the generation of the attempt that produced it so
/// subscribers can drop events from superseded attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConversionEvent {
	/// The route service reported a conversion step.
	StatusUpdated { generation: u64, message: StatusMessage },
	/// The first batch was signed. Progress UI should be hidden from here on.
	TransactionSigned { generation: u64 },
	/// A batch landed on chain.
	BatchConfirmed {
		generation: u64,
		notification: Notification,
		receipt: SubmissionReceipt,
	},
	/// A batch failed. No further batches will be submitted.
	BatchFailed {
		generation: u64,
		notification: Notification,
	},
	/// Every batch landed. Triggers the social-share flow.
	ConversionCompleted {
		generation: u64,
		summary: ShareSummary,
	},
	/// The attempt ended with an error.
	ConversionFailed { generation: u64, message: String },
}

impl ConversionEvent {
	/// Generation of the attempt that emitted the event.
	pub fn generation(&self) -> u64 {
		match self {
			ConversionEvent::StatusUpdated { generation, .. }
			| ConversionEvent::TransactionSigned { generation }
			| ConversionEvent::BatchConfirmed { generation, .. }
			| ConversionEvent::BatchFailed { generation, .. }
			| ConversionEvent::ConversionCompleted { generation, .. }
			| ConversionEvent::ConversionFailed { generation, .. } => *generation,
		}
	}
}
