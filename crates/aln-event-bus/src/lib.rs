//! Process-local typed publish/subscribe for [`DomainEvent`]s (§4.2).
//!
//! A lock-free `async_broadcast` channel, cheaply `Clone`-able,
//! overflow-tolerant rather than backpressure-blocking a publisher on a slow
//! subscriber. This bus carries exactly one event type —
//! [`aln_types::DomainEvent`] — and never a per-connection channel; fanning
//! events out to individual consoles is the broadcast layer's job (§4.10),
//! layered on top of this bus, not folded into it.
//!
//! Subscribers are registered at startup and dropped at teardown (§4.2);
//! there is no `unsubscribe` by id because `Receiver` drop is the
//! unsubscribe.

use aln_types::DomainEvent;
use async_broadcast::{broadcast, Receiver, RecvError, Sender};

/// Default per-subscriber buffer. A subscriber lagging more than this many
/// events behind the fastest one starts losing the oldest, per
/// `set_overflow(true)` below — publishers must never block on a slow
/// broadcast-layer socket write.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
	sender: Sender<DomainEvent>,
	_keep_alive: Receiver<DomainEvent>,
}

impl EventBus {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (mut sender, keep_alive) = broadcast(capacity);
		sender.set_await_active(false);
		sender.set_overflow(true);
		Self { sender, _keep_alive: keep_alive }
	}

	/// Publish a domain event to every current subscriber. Never suspends on
	/// a slow subscriber (§5 "in-process event emission ... must not
	/// suspend") — overflow silently drops the oldest buffered event for
	/// whichever receiver is behind rather than back-pressuring the
	/// publishing service.
	pub fn publish(&self, event: DomainEvent) {
		if let Err(err) = self.sender.try_broadcast(event) {
			tracing::warn!(?err, "event bus publish could not be delivered to all subscribers");
		}
	}

	/// Register a new subscriber. Each subscriber sees every event published
	/// from this point forward, in emission order (§5 ordering guarantee),
	/// independent of every other subscriber's consumption rate.
	#[must_use]
	pub fn subscribe(&self) -> EventSubscriber {
		EventSubscriber { receiver: self.sender.new_receiver() }
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

/// A subscription handle. Cue engine subscribers additionally filter out
/// `DomainEvent::is_cue_engine_output()` events themselves (D4) — the bus
/// does not special-case any subscriber.
pub struct EventSubscriber {
	receiver: Receiver<DomainEvent>,
}

impl EventSubscriber {
	/// Await the next event, or `None` once every sender has been dropped
	/// (which never happens while the process owns an `EventBus`, but keeps
	/// this an honest `Option` rather than panicking on shutdown races).
	pub async fn recv(&mut self) -> Option<DomainEvent> {
		match self.receiver.recv().await {
			Ok(event) => Some(event),
			Err(RecvError::Closed) => None,
			Err(RecvError::Overflowed(n)) => {
				tracing::warn!(skipped = n, "event bus subscriber lagged and dropped events");
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aln_types::DomainEvent;

	#[tokio::test]
	async fn subscribers_receive_in_emission_order() {
		let bus = EventBus::new(16);
		let mut sub = bus.subscribe();

		bus.publish(DomainEvent::VideoIdle);
		bus.publish(DomainEvent::GameClockTick { elapsed: 1 });
		bus.publish(DomainEvent::GameClockTick { elapsed: 2 });

		assert!(matches!(sub.recv().await, Some(DomainEvent::VideoIdle)));
		assert!(matches!(sub.recv().await, Some(DomainEvent::GameClockTick { elapsed: 1 })));
		assert!(matches!(sub.recv().await, Some(DomainEvent::GameClockTick { elapsed: 2 })));
	}

	#[tokio::test]
	async fn independent_subscribers_each_see_every_event() {
		let bus = EventBus::new(16);
		let mut a = bus.subscribe();
		let mut b = bus.subscribe();

		bus.publish(DomainEvent::VideoIdle);

		assert!(a.recv().await.is_some());
		assert!(b.recv().await.is_some());
	}

	#[tokio::test]
	async fn publish_before_any_subscriber_is_not_an_error() {
		let bus = EventBus::new(16);
		bus.publish(DomainEvent::VideoIdle);
		let mut sub = bus.subscribe();
		bus.publish(DomainEvent::GameClockTick { elapsed: 5 });
		assert!(matches!(sub.recv().await, Some(DomainEvent::GameClockTick { elapsed: 5 })));
	}
}
