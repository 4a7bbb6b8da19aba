//! Core conversion engine for DustZap.
//!
//! This module provides the orchestration that turns a set of dust balances
//! into ETH: it prices the conversion, computes protocol fees, fetches swap
//! routes, plans batches that fit the wallet's call limit and drives them
//! through the configured execution strategy. Progress is exposed as a
//! snapshot and as events on the event bus.

use dustzap_price::PriceFeedError;
use dustzap_routes::RouteError;
use thiserror::Error;

pub mod builder;
pub mod coordinator;
pub mod event_bus;
pub mod executor;
pub mod fees;
pub mod planner;

pub use builder::{BuilderError, CoordinatorBuilder, DustZapFactories};
pub use coordinator::{ConversionCoordinator, CoordinatorSettings, InFlightGuard};
pub use event_bus::EventBus;
pub use fees::{FeeCalculator, FeeError};
pub use planner::{choose_fee_insertion_batch, BatchPlanner, PlanError};

/// Errors that end a conversion attempt.
#[derive(Debug, Error)]
pub enum ConversionError {
	/// Another attempt is still in flight.
	#[error("A conversion is already in progress")]
	AlreadyRunning,
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(u64),
	#[error("Failed to fetch ETH price: {0}")]
	PriceFetch(#[from] PriceFeedError),
	#[error("Fee computation failed: {0}")]
	Fee(#[from] FeeError),
	#[error("Failed to fetch swap routes: {0}")]
	RouteFetch(#[from] RouteError),
	#[error("Batch planning failed: {0}")]
	Plan(#[from] PlanError),
	/// A batch was rejected. Earlier batches already landed.
	#[error("Batch {batch_index} failed: {message}")]
	BatchSubmission { batch_index: usize, message: String },
}
