//! User-facing notification texts.

use dustzap_types::{Notification, NotificationKind};

const FAILURE_FALLBACK: &str = "Transaction failed";

pub(crate) fn batch_success(
	batch_index: usize,
	is_last: bool,
	is_fee_batch: bool,
	tx_url: &str,
) -> Notification {
	let title = if is_last {
		"All Dust Conversions Complete!".to_string()
	} else if is_fee_batch {
		format!("Platform Fee Charged - Batch {}", batch_index)
	} else {
		format!("Dust Conversion - Batch {}", batch_index)
	};

	Notification {
		kind: NotificationKind::Success,
		title,
		description: format!("Batch {} processed successfully. View: {}", batch_index, tx_url),
		batch_index,
	}
}

pub(crate) fn batch_failure(batch_index: usize, message: &str) -> Notification {
	let description = if message.trim().is_empty() {
		FAILURE_FALLBACK.to_string()
	} else {
		message.to_string()
	};

	Notification {
		kind: NotificationKind::Error,
		title: format!("Batch {} Failed", batch_index),
		description,
		batch_index,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_success_titles() {
		let url = "https://basescan.org/tx/0xabc";
		assert_eq!(
			batch_success(3, true, true, url).title,
			"All Dust Conversions Complete!"
		);
		assert_eq!(
			batch_success(2, false, true, url).title,
			"Platform Fee Charged - Batch 2"
		);
		assert_eq!(
			batch_success(1, false, false, url).title,
			"Dust Conversion - Batch 1"
		);
		assert_eq!(
			batch_success(1, false, false, url).description,
			"Batch 1 processed successfully. View: https://basescan.org/tx/0xabc"
		);
	}

	#[test]
	fn test_failure_fallback_message() {
		let notification = batch_failure(2, "");
		assert_eq!(notification.title, "Batch 2 Failed");
		assert_eq!(notification.description, "Transaction failed");
		assert_eq!(notification.kind, NotificationKind::Error);
	}
}
