//! Utility functions for formatting values in logs and notifications.

pub mod formatting;

pub use formatting::{format_token_amount, truncate_id, with_0x_prefix};
