use crate::registry::ConsoleRegistry;
use crate::video_status::VideoStatus;
use aln_event_bus::EventBus;
use aln_offline_queue::BatchResponse;
use aln_transactions::ScanResponse;
use aln_types::{DeviceId, DomainEvent, EventEnvelope};
use aln_video::VideoQueueService;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// `video:progress` is emitted on every VLC progress tick; rebroadcasting
/// each one to every GM console would saturate the wire for no benefit. One
/// broadcast per window is plenty for a progress bar.
const VIDEO_PROGRESS_THROTTLE: Duration = Duration::from_millis(500);

/// Subscribes to the shared [`EventBus`] and turns every domain event into
/// the one outbound wire shape (§4.10), fanning it out through a
/// [`ConsoleRegistry`]. Unicast replies (`transaction:result`, `batch:ack`)
/// don't travel over the bus at all — the caller that already holds the
/// response object hands it to [`BroadcastLayer::send_transaction_result`]/
/// [`BroadcastLayer::send_batch_ack`] directly.
#[derive(Clone)]
pub struct BroadcastLayer {
	bus: EventBus,
	registry: ConsoleRegistry,
	video: Arc<VideoQueueService>,
	last_video_progress: Arc<Mutex<Option<Instant>>>,
}

impl BroadcastLayer {
	#[must_use]
	pub fn new(bus: EventBus, registry: ConsoleRegistry, video: Arc<VideoQueueService>) -> Self {
		Self { bus, registry, video, last_video_progress: Arc::new(Mutex::new(None)) }
	}

	#[must_use]
	pub fn registry(&self) -> &ConsoleRegistry {
		&self.registry
	}

	/// Start the subscription loop. Mirrors the `CancellationToken`-raced
	/// `tokio::select!` shape every other ambient background loop in this
	/// workspace (the clock ticker, the device monitor, the cue engine's own
	/// event loop) already uses.
	pub fn spawn(&self) -> CancellationToken {
		let token = CancellationToken::new();
		let shutdown = token.clone();
		let layer = self.clone();
		let mut subscriber = self.bus.subscribe();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = shutdown.cancelled() => break,
					event = subscriber.recv() => {
						let Some(event) = event else { break };
						layer.dispatch(&event);
					}
				}
			}
		});

		token
	}

	fn dispatch(&self, event: &DomainEvent) {
		if is_video_event(event) {
			if matches!(event, DomainEvent::VideoProgress { .. }) && !self.video_progress_due() {
				return;
			}
			let status = VideoStatus::snapshot(&self.video);
			let envelope = EventEnvelope { event: "video:status".into(), data: serde_json::to_value(&status).unwrap_or(Value::Null), timestamp: chrono::Utc::now() };
			self.registry.broadcast(&envelope);
			return;
		}

		let Some(wire_name) = broadcast_name(event) else { return };
		let mut envelope = EventEnvelope::wrap(event);
		envelope.event = wire_name.to_string();
		self.registry.broadcast(&envelope);
	}

	fn video_progress_due(&self) -> bool {
		let mut last = self.last_video_progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		let now = Instant::now();
		match *last {
			Some(previous) if now.duration_since(previous) < VIDEO_PROGRESS_THROTTLE => false,
			_ => {
				*last = Some(now);
				true
			}
		}
	}

	/// Unicast the synchronous scan reply to the socket that submitted it
	/// (§4.10) — sent regardless of accepted/duplicate/rejected status; the
	/// broadcast `transaction:new` sibling only fires for accepted scans, via
	/// the bus subscription above.
	pub fn send_transaction_result(&self, device_id: &DeviceId, response: &ScanResponse) -> bool {
		let envelope = EventEnvelope { event: "transaction:result".into(), data: serde_json::to_value(response).unwrap_or(Value::Null), timestamp: chrono::Utc::now() };
		self.registry.unicast(device_id, &envelope)
	}

	pub fn send_batch_ack(&self, device_id: &DeviceId, response: &BatchResponse) -> bool {
		let envelope = EventEnvelope { event: "batch:ack".into(), data: serde_json::to_value(response).unwrap_or(Value::Null), timestamp: chrono::Utc::now() };
		self.registry.unicast(device_id, &envelope)
	}
}

fn is_video_event(event: &DomainEvent) -> bool {
	matches!(
		event,
		DomainEvent::VideoLoading { .. } | DomainEvent::VideoStarted { .. } | DomainEvent::VideoPaused { .. } | DomainEvent::VideoResumed { .. } | DomainEvent::VideoProgress { .. } | DomainEvent::VideoCompleted { .. } | DomainEvent::VideoIdle
	)
}

/// The wire name a domain event rebroadcasts under, or `None` if it never
/// reaches a console (§4.10 lists the closed set; everything else —
/// `scan:logged`, `gameclock:*`, `transaction:duplicate`/`rejected` — stays
/// internal or unicast-only).
fn broadcast_name(event: &DomainEvent) -> Option<&'static str> {
	match event {
		DomainEvent::SessionCreated(_) => Some("session:created"),
		DomainEvent::SessionUpdated(_) => Some("session:updated"),
		DomainEvent::SessionOvertime { .. } => Some("session:overtime"),
		DomainEvent::TransactionAccepted { .. } => Some("transaction:new"),
		DomainEvent::TransactionDeleted { .. } => Some("transaction:deleted"),
		DomainEvent::ScoreUpdated(_) => Some("score:updated"),
		DomainEvent::ScoreAdjusted { .. } => Some("score:adjusted"),
		DomainEvent::ScoresReset { .. } => Some("scores:reset"),
		DomainEvent::GroupCompleted(_) => Some("group:completed"),
		DomainEvent::CueFired { .. }
		| DomainEvent::CueStarted { .. }
		| DomainEvent::CueStatus { .. }
		| DomainEvent::CueCompleted { .. }
		| DomainEvent::CueError { .. }
		| DomainEvent::CueConflict { .. } => Some(event.name()),
		DomainEvent::DeviceConnected { .. } => Some("device:connected"),
		DomainEvent::DeviceDisconnected { .. } => Some("device:disconnected"),
		DomainEvent::OfflineQueueProcessed { .. } => Some("offline:queue:processed"),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::{ConsoleSink, SendError};
	use aln_types::{DeviceType, Transaction, TransactionMode, TransactionStatus};
	use std::sync::Mutex as StdMutex;

	struct RecordingSink {
		received: StdMutex<Vec<String>>,
	}

	impl ConsoleSink for RecordingSink {
		fn send(&self, envelope: &EventEnvelope) -> Result<(), SendError> {
			self.received.lock().unwrap().push(envelope.event.clone());
			Ok(())
		}
	}

	fn transaction() -> Transaction {
		Transaction {
			id: "tx1".into(),
			session_id: "s1".into(),
			token_id: "t1".into(),
			team_id: "team-a".into(),
			device_id: "gm-1".into(),
			device_type: DeviceType::Gm,
			mode: TransactionMode::Detective,
			points: 0,
			status: TransactionStatus::Accepted,
			rejection_reason: None,
			original_transaction_id: None,
			timestamp: chrono::Utc::now(),
		}
	}

	#[tokio::test]
	async fn session_created_broadcasts_under_its_own_name() {
		let bus = EventBus::new(16);
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: StdMutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let layer = BroadcastLayer::new(bus.clone(), registry, video);
		let shutdown = layer.spawn();

		bus.publish(DomainEvent::SessionOvertime { session_id: "s1".into() });
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert_eq!(sink.received.lock().unwrap().as_slice(), ["session:overtime"]);
		shutdown.cancel();
	}

	#[tokio::test]
	async fn transaction_accepted_broadcasts_as_transaction_new() {
		let bus = EventBus::new(16);
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: StdMutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let layer = BroadcastLayer::new(bus.clone(), registry, video);
		let shutdown = layer.spawn();

		bus.publish(DomainEvent::TransactionAccepted {
			transaction: transaction(),
			team_score: aln_types::TeamScore::new("team-a".into()),
			device_tracking: aln_types::event::DeviceTracking { device_id: "gm-1".into(), token_id: "t1".into() },
			group_bonus: None,
		});
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert_eq!(sink.received.lock().unwrap().as_slice(), ["transaction:new"]);
		shutdown.cancel();
	}

	#[tokio::test]
	async fn transaction_duplicate_never_reaches_a_console() {
		let bus = EventBus::new(16);
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: StdMutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let layer = BroadcastLayer::new(bus.clone(), registry, video);
		let shutdown = layer.spawn();

		bus.publish(DomainEvent::TransactionDuplicate { transaction: transaction(), claimed_by: "team-a".into(), original_transaction_id: "tx0".into() });
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(sink.received.lock().unwrap().is_empty());
		shutdown.cancel();
	}

	#[tokio::test]
	async fn video_events_collapse_into_a_single_video_status_name() {
		let bus = EventBus::new(16);
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: StdMutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let layer = BroadcastLayer::new(bus.clone(), registry, video);
		let shutdown = layer.spawn();

		bus.publish(DomainEvent::VideoLoading { token_id: "v1".into() });
		bus.publish(DomainEvent::VideoStarted { token_id: "v1".into(), duration_secs: 60 });
		tokio::time::sleep(Duration::from_millis(30)).await;

		let received = sink.received.lock().unwrap();
		assert!(received.iter().all(|name| name == "video:status"));
		assert_eq!(received.len(), 2);
	}

	#[test]
	fn unicast_transaction_result_does_not_touch_the_bus() {
		let bus = EventBus::new(16);
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: StdMutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let layer = BroadcastLayer::new(bus, registry, video);

		let response = ScanResponse {
			status: TransactionStatus::Accepted,
			message: "ok".into(),
			transaction_id: "tx1".into(),
			transaction: transaction(),
			token: None,
			points: Some(10),
			original_transaction_id: None,
			claimed_by: None,
			video_playing: false,
			wait_time: None,
		};

		assert!(layer.send_transaction_result(&"gm-1".to_string(), &response));
		assert_eq!(sink.received.lock().unwrap().as_slice(), ["transaction:result"]);
	}
}
