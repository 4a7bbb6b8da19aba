//! Shared coordinator state.
//!
//! The snapshot lives behind a synchronous mutex that is only held for the
//! duration of a field update, never across an await point. Every update is
//! tagged with the generation of the attempt that produced it and dropped if
//! a newer attempt has started since.

use crate::ConversionError;
use dustzap_types::{BatchProgress, ConversionPhase, ConversionSnapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct SharedState {
	inner: Mutex<ConversionSnapshot>,
}

impl SharedState {
	fn lock(&self) -> MutexGuard<'_, ConversionSnapshot> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub(crate) fn snapshot(&self) -> ConversionSnapshot {
		self.lock().clone()
	}

	/// Starts a new attempt unless one is already in flight.
	pub(crate) fn try_begin(
		self: &Arc<Self>,
		total_steps: usize,
	) -> Result<InFlightGuard, ConversionError> {
		let mut state = self.lock();
		if state.in_flight {
			return Err(ConversionError::AlreadyRunning);
		}

		let generation = state.generation + 1;
		*state = ConversionSnapshot {
			generation,
			phase: ConversionPhase::FetchingPrice,
			in_flight: true,
			batch_progress: BatchProgress::default(),
			status_messages: Vec::new(),
			total_steps,
			aggregate_trading_loss: 0.0,
			transaction_signed: false,
			fetching_routes: true,
			last_result: None,
			last_error: None,
		};

		Ok(InFlightGuard {
			state: Arc::clone(self),
			generation,
		})
	}

	/// Applies `update` if `generation` is still current.
	///
	/// Returns whether the update was applied.
	pub(crate) fn update<F>(&self, generation: u64, update: F) -> bool
	where
		F: FnOnce(&mut ConversionSnapshot),
	{
		let mut state = self.lock();
		if state.generation != generation {
			tracing::debug!(
				generation,
				current = state.generation,
				"Discarding update from superseded attempt"
			);
			return false;
		}
		update(&mut state);
		true
	}
}

/// Marks an attempt as in flight until dropped.
///
/// Dropping the guard (including when the attempt future is abandoned)
/// clears the in-flight flag of its generation.
pub struct InFlightGuard {
	state: Arc<SharedState>,
	generation: u64,
}

impl InFlightGuard {
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub(crate) fn update<F>(&self, update: F) -> bool
	where
		F: FnOnce(&mut ConversionSnapshot),
	{
		self.state.update(self.generation, update)
	}
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		self.state.update(self.generation, |state| {
			state.in_flight = false;
			state.fetching_routes = false;
			if !matches!(state.phase, ConversionPhase::Succeeded | ConversionPhase::Failed) {
				state.phase = ConversionPhase::Failed;
				state.last_error = Some("Conversion abandoned".to_string());
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_second_begin_rejected_while_in_flight() {
		let state = Arc::new(SharedState::default());
		let guard = state.try_begin(3).unwrap();

		assert!(matches!(state.try_begin(3), Err(ConversionError::AlreadyRunning)));

		drop(guard);
		let next = state.try_begin(2).unwrap();
		assert_eq!(next.generation(), 2);
		assert_eq!(state.snapshot().total_steps, 2);
	}

	#[test]
	fn test_stale_generation_update_discarded() {
		let state = Arc::new(SharedState::default());
		let first = state.try_begin(1).unwrap();
		let first_generation = first.generation();
		drop(first);
		let _second = state.try_begin(1).unwrap();

		let applied = state.update(first_generation, |s| s.transaction_signed = true);

		assert!(!applied);
		assert!(!state.snapshot().transaction_signed);
	}

	#[test]
	fn test_dropped_guard_marks_attempt_abandoned() {
		let state = Arc::new(SharedState::default());
		let guard = state.try_begin(1).unwrap();
		guard.update(|s| s.phase = ConversionPhase::Executing);
		drop(guard);

		let snapshot = state.snapshot();
		assert!(!snapshot.in_flight);
		assert!(!snapshot.fetching_routes);
		assert_eq!(snapshot.phase, ConversionPhase::Failed);
		assert!(snapshot.last_error.is_some());
	}

	#[test]
	fn test_begin_resets_previous_attempt() {
		let state = Arc::new(SharedState::default());
		let guard = state.try_begin(1).unwrap();
		guard.update(|s| {
			s.transaction_signed = true;
			s.aggregate_trading_loss = 4.2;
			s.phase = ConversionPhase::Succeeded;
		});
		drop(guard);

		let _next = state.try_begin(5).unwrap();
		let snapshot = state.snapshot();
		assert!(!snapshot.transaction_signed);
		assert_eq!(snapshot.aggregate_trading_loss, 0.0);
		assert!(snapshot.fetching_routes);
		assert_eq!(snapshot.phase, ConversionPhase::FetchingPrice);
	}
}
