use crate::config::{OrchestratorConfig, StorageType};
use aln_aggregator::StateAggregator;
use aln_broadcast::{BroadcastLayer, ConsoleRegistry};
use aln_catalog::TokenCatalog;
use aln_clock::GameClock;
use aln_cues::{CueEngine, NoopCommandSink};
use aln_devices::DeviceRegistry;
use aln_event_bus::EventBus;
use aln_offline_queue::OfflineQueueService;
use aln_persistence::{FileStore, MemoryStore, Persistence};
use aln_session::SessionService;
use aln_transactions::TransactionService;
use aln_video::VideoQueueService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Every wired service, the shapes the HTTP/WS layer below hands requests
/// to. Built in the dependency order §4.15 names — persistence → catalog →
/// clock → session → transactions → video → offline-queue → cue-engine →
/// device-registry → aggregator → broadcast — each later service taking an
/// `Arc` of everything it depends on.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<OrchestratorConfig>,
	pub bus: EventBus,
	pub persistence: Arc<dyn Persistence>,
	pub catalog: Arc<TokenCatalog>,
	pub session: Arc<SessionService>,
	pub transactions: Arc<TransactionService>,
	pub video: Arc<VideoQueueService>,
	pub offline_queue: Arc<OfflineQueueService>,
	pub cue_engine: Arc<CueEngine>,
	pub devices: Arc<DeviceRegistry>,
	pub aggregator: Arc<StateAggregator>,
	pub broadcast: Arc<BroadcastLayer>,
	pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Every background loop's shutdown handle, cancelled together from `main`.
pub struct BackgroundTasks {
	pub tokens: Vec<CancellationToken>,
}

impl BackgroundTasks {
	pub fn cancel_all(&self) {
		for token in &self.tokens {
			token.cancel();
		}
	}
}

impl AppState {
	/// # Errors
	/// Propagates a [`aln_persistence::PersistenceError`] if the `file`
	/// storage backend cannot create its data directory.
	pub async fn build(config: OrchestratorConfig) -> anyhow::Result<(Self, BackgroundTasks)> {
		let config = Arc::new(config);
		let bus = EventBus::default();

		let persistence: Arc<dyn Persistence> = match config.storage_type {
			StorageType::Memory => Arc::new(MemoryStore::new()),
			StorageType::File => Arc::new(FileStore::new(config.data_dir.clone()).await?),
		};

		// Token-catalog loading is a §1 non-goal; the venue's content set is
		// expected to be provided out of band once that integration exists.
		let catalog = TokenCatalog::new(vec![])?;
		let catalog_handle = Arc::new(catalog.clone());

		let clock = Arc::new(GameClock::new(bus.clone(), Some(config.session_timeout_minutes.saturating_mul(60))));
		let transactions = Arc::new(TransactionService::with_recent_limit(catalog.clone(), bus.clone(), config.recent_transactions_count));
		let session = Arc::new(SessionService::new(Arc::clone(&persistence), bus.clone(), Arc::clone(&clock), Arc::clone(&transactions), Some(config.session_timeout_minutes.saturating_mul(60))));
		session.restore_from_persistence().await?;

		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let offline_queue = Arc::new(OfflineQueueService::with_max_size(bus.clone(), config.max_offline_queue_size));
		offline_queue.restore(persistence.as_ref()).await?;
		session.drain_offline_queue(&offline_queue).await?;

		let cue_engine = CueEngine::new(bus.clone(), Arc::clone(&clock), Arc::clone(&video), Arc::new(catalog), Arc::new(NoopCommandSink), Default::default());
		let cue_engine = Arc::new(cue_engine);
		let cue_loop = cue_engine.spawn_event_loop();

		let devices = Arc::new(DeviceRegistry::new(bus.clone()));
		let device_monitor = devices.start_monitor();

		let registry = ConsoleRegistry::new();
		let broadcast = Arc::new(BroadcastLayer::new(bus.clone(), registry, Arc::clone(&video)));
		let broadcast_loop = broadcast.spawn();

		let aggregator = Arc::new(StateAggregator::new(bus.clone(), Arc::clone(&session), Arc::clone(&video), Arc::clone(&devices), Arc::clone(&offline_queue), (*broadcast).clone()));
		let aggregator_loop = aggregator.spawn();

		let state = Self { config, bus, persistence, catalog: catalog_handle, session, transactions, video, offline_queue, cue_engine, devices, aggregator, broadcast, started_at: chrono::Utc::now() };
		let background = BackgroundTasks { tokens: vec![cue_loop, device_monitor, broadcast_loop, aggregator_loop] };
		Ok((state, background))
	}
}
