//! State aggregator (§4.12): composes the `sync:full` snapshot a console
//! needs on attach or after an offline-queue drain, and hands out a strong
//! ETag for `If-None-Match` conditional replies.

pub mod etag;
pub mod snapshot;

pub use etag::etag;
pub use snapshot::{most_recent, OrchestratorStatus, SessionSummary, StateSnapshot, SystemStatus, VlcStatus, MAX_RECENT_TRANSACTIONS};

use aln_broadcast::{BroadcastLayer, VideoStatus};
use aln_devices::DeviceRegistry;
use aln_event_bus::EventBus;
use aln_offline_queue::OfflineQueueService;
use aln_session::SessionService;
use aln_types::{DomainEvent, EventEnvelope};
use aln_video::VideoQueueService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct StateAggregator {
	bus: EventBus,
	session: Arc<SessionService>,
	video: Arc<VideoQueueService>,
	devices: Arc<DeviceRegistry>,
	offline_queue: Arc<OfflineQueueService>,
	broadcast: BroadcastLayer,
	vlc_connected: AtomicBool,
	recent_limit: usize,
}

impl StateAggregator {
	#[must_use]
	pub fn new(bus: EventBus, session: Arc<SessionService>, video: Arc<VideoQueueService>, devices: Arc<DeviceRegistry>, offline_queue: Arc<OfflineQueueService>, broadcast: BroadcastLayer) -> Self {
		Self { bus, session, video, devices, offline_queue, broadcast, vlc_connected: AtomicBool::new(false), recent_limit: MAX_RECENT_TRANSACTIONS }
	}

	/// The unimplemented VLC driver (§1 non-goal) has no real connection to
	/// report; this is the seam it would call once wired.
	pub fn set_vlc_connected(&self, connected: bool) {
		self.vlc_connected.store(connected, Ordering::SeqCst);
	}

	pub async fn snapshot(&self) -> StateSnapshot {
		let session = self.session.current_session().await;
		let (summary, scores, recent) = match session {
			Some(session) => {
				let teams = session.scores.iter().map(|s| s.team_id.clone()).collect();
				let summary = SessionSummary { id: session.id, name: session.name, status: session.status, start_time: session.start_time, end_time: session.end_time, teams, metadata: session.metadata };
				(Some(summary), session.scores, most_recent(&session.transactions, self.recent_limit))
			}
			None => (None, vec![], vec![]),
		};

		StateSnapshot {
			session: summary,
			scores,
			recent_transactions: recent,
			video_status: VideoStatus::snapshot(&self.video),
			devices: self.devices.snapshot(),
			system_status: SystemStatus {
				orchestrator: OrchestratorStatus::Online,
				vlc: if self.vlc_connected.load(Ordering::SeqCst) { VlcStatus::Connected } else { VlcStatus::Disconnected },
				offline: self.offline_queue.is_offline(),
			},
		}
	}

	/// Compose a fresh snapshot and broadcast it as `sync:full` to every
	/// connected console — the reply to a console's own `sync:request` and
	/// the trigger after `offline:queue:processed` (§4.12) both funnel
	/// through here so there is exactly one function that builds this frame.
	pub async fn broadcast_sync_full(&self) -> StateSnapshot {
		let snapshot = self.snapshot().await;
		let data = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
		let envelope = EventEnvelope { event: "sync:full".into(), data, timestamp: chrono::Utc::now() };
		self.broadcast.registry().broadcast(&envelope);
		snapshot
	}

	/// Subscribes to the bus for `offline:queue:processed` and rebroadcasts
	/// `sync:full` automatically (§4.12 trigger (b)); trigger (a), a fresh
	/// console's `sync:request`, is a direct call into `snapshot`/
	/// `broadcast_sync_full` from the composition root's WS handler, not a
	/// bus event.
	pub fn spawn(self: &Arc<Self>) -> CancellationToken {
		let token = CancellationToken::new();
		let shutdown = token.clone();
		let aggregator = Arc::clone(self);
		let mut subscriber = self.bus.subscribe();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = shutdown.cancelled() => break,
					event = subscriber.recv() => {
						let Some(event) = event else { break };
						if matches!(event, DomainEvent::OfflineQueueProcessed { .. }) {
							aggregator.broadcast_sync_full().await;
						}
					}
				}
			}
		});

		token
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aln_broadcast::{ConsoleRegistry, ConsoleSink, SendError};
	use aln_catalog::TokenCatalog;
	use aln_clock::GameClock;
	use aln_persistence::MemoryStore;
	use aln_transactions::TransactionService;
	use std::sync::Mutex;

	struct RecordingSink {
		received: Mutex<Vec<String>>,
	}

	impl ConsoleSink for RecordingSink {
		fn send(&self, envelope: &aln_types::EventEnvelope) -> Result<(), SendError> {
			self.received.lock().unwrap().push(envelope.event.clone());
			Ok(())
		}
	}

	async fn build() -> (Arc<StateAggregator>, Arc<SessionService>, Arc<RecordingSink>, EventBus) {
		let bus = EventBus::new(64);
		let persistence: Arc<dyn aln_persistence::Persistence> = Arc::new(MemoryStore::new());
		let clock = Arc::new(GameClock::new(bus.clone(), None));
		let catalog = TokenCatalog::new(vec![]).unwrap();
		let transactions = Arc::new(TransactionService::new(catalog, bus.clone()));
		let session = Arc::new(SessionService::new(persistence, bus.clone(), clock, transactions, None));
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let devices = Arc::new(DeviceRegistry::new(bus.clone()));
		let offline_queue = Arc::new(OfflineQueueService::new(bus.clone()));
		let registry = ConsoleRegistry::new();
		let sink = Arc::new(RecordingSink { received: Mutex::new(vec![]) });
		registry.register("gm-1".into(), sink.clone());
		let broadcast = BroadcastLayer::new(bus.clone(), registry, Arc::clone(&video));
		let aggregator = Arc::new(StateAggregator::new(bus.clone(), Arc::clone(&session), video, devices, offline_queue, broadcast));
		(aggregator, session, sink, bus)
	}

	#[tokio::test]
	async fn empty_session_snapshot_has_no_session() {
		let (aggregator, _session, _sink, _bus) = build().await;
		let snapshot = aggregator.snapshot().await;
		assert!(snapshot.session.is_none());
		assert!(snapshot.scores.is_empty());
	}

	#[tokio::test]
	async fn active_session_populates_summary_and_scores() {
		let (aggregator, session, _sink, _bus) = build().await;
		session.create_session("Game Night".into(), &["Team Alpha".into()]).await.unwrap();

		let snapshot = aggregator.snapshot().await;
		assert_eq!(snapshot.session.unwrap().name, "Game Night");
		assert_eq!(snapshot.scores.len(), 1);
	}

	#[tokio::test]
	async fn broadcast_sync_full_reaches_every_console() {
		let (aggregator, _session, sink, _bus) = build().await;
		aggregator.broadcast_sync_full().await;
		assert_eq!(sink.received.lock().unwrap().as_slice(), ["sync:full"]);
	}

	#[tokio::test]
	async fn offline_queue_processed_triggers_an_automatic_sync_full() {
		let (aggregator, _session, sink, bus) = build().await;
		let shutdown = aggregator.spawn();

		bus.publish(DomainEvent::OfflineQueueProcessed { queue_size: 0, processed: 2, failed: 0 });
		tokio::time::sleep(std::time::Duration::from_millis(30)).await;

		assert_eq!(sink.received.lock().unwrap().as_slice(), ["sync:full"]);
		shutdown.cancel();
	}
}
