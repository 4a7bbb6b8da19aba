//! Common types module for the DustZap conversion engine.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: the opaque operations submitted to wallets, fee and batch
//! plans, per-attempt progress records and the events published to the
//! presentation layer.

/// Conversion request, progress and result types.
pub mod conversion;
/// Wallet execution request and receipt types.
pub mod delivery;
/// Event types published while a conversion attempt runs.
pub mod events;
/// Network configuration and chain metadata.
pub mod networks;
/// The opaque call descriptor executed by the wallet layer.
pub mod operation;
/// Fee and batch plans produced before submission.
pub mod plan;
/// Registry trait for named implementations.
pub mod registry;
/// Formatting helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, U256};
pub use conversion::*;
pub use delivery::*;
pub use events::*;
pub use networks::{ChainMetadata, NetworkConfig, NetworksConfig};
pub use operation::Operation;
pub use plan::*;
pub use registry::ImplementationRegistry;
pub use utils::{format_token_amount, truncate_id, with_0x_prefix};
pub use validation::*;
