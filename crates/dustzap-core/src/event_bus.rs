//! Broadcast channel carrying conversion events to subscribers.
//!
//! Publishing never blocks. Slow subscribers lag and lose the oldest events
//! rather than holding back the coordinator.

use dustzap_types::ConversionEvent;
use tokio::sync::broadcast;

/// Fan-out channel for [`ConversionEvent`]s.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ConversionEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning the number of subscribers reached.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: ConversionEvent,
	) -> Result<usize, broadcast::error::SendError<ConversionEvent>> {
		self.sender.send(event)
	}
}
