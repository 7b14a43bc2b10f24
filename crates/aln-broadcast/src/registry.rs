use aln_types::{DeviceId, EventEnvelope};
use dashmap::DashMap;
use std::sync::Arc;

/// A single outbound channel to one connected console or device. One real
/// implementation wraps an `axum` websocket's `mpsc::UnboundedSender<Message>`;
/// `send` must never suspend (§5 "in-process event emission ... must not
/// suspend" extends to the socket write itself, not just the bus hop) — a
/// full channel is a closed/stalled peer, not backpressure to wait out.
pub trait ConsoleSink: Send + Sync {
	fn send(&self, envelope: &EventEnvelope) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

/// Every connected console/device, keyed the same way `aln-devices`'s
/// `DeviceRegistry` keys its own connection records — the two registries
/// track different things about the same id (liveness vs. an outbound pipe)
/// and neither depends on the other.
#[derive(Clone, Default)]
pub struct ConsoleRegistry {
	sinks: Arc<DashMap<DeviceId, Arc<dyn ConsoleSink>>>,
}

impl ConsoleRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, device_id: DeviceId, sink: Arc<dyn ConsoleSink>) {
		self.sinks.insert(device_id, sink);
	}

	pub fn unregister(&self, device_id: &str) {
		self.sinks.remove(device_id);
	}

	#[must_use]
	pub fn connected_count(&self) -> usize {
		self.sinks.len()
	}

	/// Fan the envelope out to every registered sink. A sink whose peer has
	/// gone away is dropped from the registry instead of retried.
	pub fn broadcast(&self, envelope: &EventEnvelope) {
		let mut dead = Vec::new();
		for entry in self.sinks.iter() {
			if entry.value().send(envelope).is_err() {
				dead.push(entry.key().clone());
			}
		}
		for id in dead {
			tracing::warn!(device_id = %id, "console sink closed, pruning from registry");
			self.sinks.remove(&id);
		}
	}

	/// Deliver to exactly one device, for the unicast paths (§4.10): a scan's
	/// `transaction:result` reply, a batch's `batch:ack`. Returns whether a
	/// live sink for `device_id` was found.
	pub fn unicast(&self, device_id: &str, envelope: &EventEnvelope) -> bool {
		let Some(sink) = self.sinks.get(device_id).map(|entry| Arc::clone(entry.value())) else {
			return false;
		};
		if sink.send(envelope).is_err() {
			self.sinks.remove(device_id);
			return false;
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aln_types::DomainEvent;
	use std::sync::Mutex;

	struct RecordingSink {
		received: Mutex<Vec<String>>,
	}

	impl ConsoleSink for RecordingSink {
		fn send(&self, envelope: &EventEnvelope) -> Result<(), SendError> {
			self.received.lock().unwrap().push(envelope.event.clone());
			Ok(())
		}
	}

	struct DeadSink;
	impl ConsoleSink for DeadSink {
		fn send(&self, _: &EventEnvelope) -> Result<(), SendError> {
			Err(SendError)
		}
	}

	#[test]
	fn broadcast_reaches_every_registered_sink() {
		let registry = ConsoleRegistry::new();
		let a = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		let b = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		registry.register("gm-a".into(), a.clone());
		registry.register("gm-b".into(), b.clone());

		registry.broadcast(&EventEnvelope::wrap(&DomainEvent::VideoIdle));

		assert_eq!(a.received.lock().unwrap().as_slice(), ["video:idle"]);
		assert_eq!(b.received.lock().unwrap().as_slice(), ["video:idle"]);
	}

	#[test]
	fn unicast_reaches_only_the_named_device() {
		let registry = ConsoleRegistry::new();
		let a = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		let b = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		registry.register("gm-a".into(), a.clone());
		registry.register("gm-b".into(), b.clone());

		let delivered = registry.unicast("gm-a", &EventEnvelope::wrap(&DomainEvent::VideoIdle));

		assert!(delivered);
		assert_eq!(a.received.lock().unwrap().len(), 1);
		assert!(b.received.lock().unwrap().is_empty());
	}

	#[test]
	fn unicast_to_unknown_device_reports_not_delivered() {
		let registry = ConsoleRegistry::new();
		assert!(!registry.unicast("ghost", &EventEnvelope::wrap(&DomainEvent::VideoIdle)));
	}

	#[test]
	fn dead_sink_is_pruned_on_next_broadcast() {
		let registry = ConsoleRegistry::new();
		registry.register("gm-a".into(), Arc::new(DeadSink));
		assert_eq!(registry.connected_count(), 1);

		registry.broadcast(&EventEnvelope::wrap(&DomainEvent::VideoIdle));

		assert_eq!(registry.connected_count(), 0);
	}

	#[test]
	fn unregister_stops_further_delivery() {
		let registry = ConsoleRegistry::new();
		let a = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		registry.register("gm-a".into(), a.clone());
		registry.unregister("gm-a");

		registry.broadcast(&EventEnvelope::wrap(&DomainEvent::VideoIdle));

		assert!(a.received.lock().unwrap().is_empty());
	}
}
