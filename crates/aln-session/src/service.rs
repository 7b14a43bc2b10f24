use crate::error::{Result, SessionError};
use aln_clock::GameClock;
use aln_event_bus::EventBus;
use aln_offline_queue::{BatchResponse, OfflineQueueService};
use aln_persistence::{keys, Persistence};
use aln_transactions::{ScanResponse, TransactionService};
use aln_types::session::SessionStatus;
use aln_types::{DeviceId, DomainEvent, ScanRequest, Session, TeamId, TeamScore};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session lifecycle and the single-writer owner of `session.scores` (§4.3).
/// Owns the canonical `Session` value behind one lock; every mutation in
/// this file happens while that lock is held for the whole operation,
/// which is what gives `processScan`'s step 4-6 atomicity (§5) its actual
/// implementation — no separate actor hop, no event round-trip required to
/// observe your own write.
pub struct SessionService {
	persistence: Arc<dyn Persistence>,
	bus: EventBus,
	clock: Arc<GameClock>,
	transactions: Arc<TransactionService>,
	current: RwLock<Option<Session>>,
	expected_duration_secs: Option<i64>,
	overtime_timer: RwLock<Option<CancellationToken>>,
}

impl SessionService {
	#[must_use]
	pub fn new(persistence: Arc<dyn Persistence>, bus: EventBus, clock: Arc<GameClock>, transactions: Arc<TransactionService>, expected_duration_secs: Option<i64>) -> Self {
		Self { persistence, bus, clock, transactions, current: RwLock::new(None), expected_duration_secs, overtime_timer: RwLock::new(None) }
	}

	#[must_use]
	pub async fn current_session(&self) -> Option<Session> {
		self.current.read().await.clone()
	}

	/// `createSession(name, teams[])`: ends any current session first, then
	/// allocates, arms the clock, and persists under both `session:<id>`
	/// and `session:current`.
	pub async fn create_session(&self, name: String, teams: &[TeamId]) -> Result<Session> {
		if self.current.read().await.is_some() {
			self.end_session().await.ok();
		}

		let id = Uuid::new_v4().to_string();
		let session = Session::new(id, name, teams);
		self.clock.start().await.ok();
		self.persist(&session).await?;
		self.bus.publish(DomainEvent::SessionCreated(session.clone()));
		self.arm_overtime_timer(&session.id).await;
		*self.current.write().await = Some(session.clone());
		Ok(session)
	}

	/// `addTeamToSession(teamId)`: idempotent-by-duplicate — error if the
	/// team already exists.
	pub async fn add_team_to_session(&self, team_id: TeamId) -> Result<()> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		if session.has_team(&team_id) {
			return Err(SessionError::TeamAlreadyExists(team_id));
		}
		session.scores.push(TeamScore::new(team_id));
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(())
	}

	/// `updateSessionStatus(status)`: cascades clock arm/pause/stop and the
	/// session-level overtime warning timer; illegal transitions fail
	/// without mutating anything (§4.3).
	pub async fn update_session_status(&self, status: SessionStatus) -> Result<Session> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		if !session.status.can_transition_to(status) {
			return Err(SessionError::IllegalTransition { from: session.status, to: status });
		}

		session.status = status;
		match status {
			SessionStatus::Active if session.game_start_time.is_none() => {
				session.game_start_time = Some(Utc::now());
				self.clock.start().await.ok();
			}
			SessionStatus::Active => {
				self.clock.resume().await.ok();
			}
			SessionStatus::Paused => {
				self.clock.pause().await.ok();
				self.cancel_overtime_timer().await;
			}
			SessionStatus::Ended => {
				session.end_time = Some(Utc::now());
				self.clock.stop().await;
				self.cancel_overtime_timer().await;
			}
			SessionStatus::Setup => {}
		}

		let snapshot = session.clone();
		drop(guard);

		if status == SessionStatus::Active {
			self.arm_overtime_timer(&snapshot.id).await;
		}
		if status == SessionStatus::Ended {
			self.archive(&snapshot).await?;
		}
		self.persist(&snapshot).await?;
		self.bus.publish(DomainEvent::SessionUpdated(snapshot.clone()));
		Ok(snapshot)
	}

	/// `endSession()`: completes, archives, and clears `current` only if it
	/// is still the same session (race protection against a concurrent
	/// `createSession`).
	pub async fn end_session(&self) -> Result<Session> {
		let ended = self.update_session_status(SessionStatus::Ended).await?;
		let mut guard = self.current.write().await;
		if guard.as_ref().is_some_and(|s| s.id == ended.id) {
			*guard = None;
		}
		Ok(ended)
	}

	pub async fn add_device(&self, device_id: DeviceId) -> Result<()> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		if !session.connected_devices.contains(&device_id) {
			session.connected_devices.push(device_id);
		}
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(())
	}

	pub async fn remove_device(&self, device_id: &str) -> Result<()> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		session.connected_devices.retain(|d| d != device_id);
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(())
	}

	/// Adjudicate a scan against the current session, holding the session
	/// lock for the full duration of `TransactionService::process_scan`
	/// (§5 adjudication atomicity).
	pub async fn process_scan(&self, request: ScanRequest, video_playing: bool, video_wait_time: Option<u32>) -> Result<ScanResponse> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		let response = self.transactions.process_scan(request, session, video_playing, video_wait_time)?;
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(response)
	}

	pub async fn adjust_team_score(&self, team_id: &str, delta: i64, reason: String, gm: String) -> Result<TeamScore> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		let updated = self.transactions.adjust_team_score(session, team_id, delta, reason, gm)?;
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(updated)
	}

	pub async fn delete_transaction(&self, transaction_id: &str) -> Result<()> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		self.transactions.delete_transaction(session, transaction_id)?;
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok(())
	}

	/// `batch:submit` (§4.8): adjudicates every request in the batch against
	/// the live session under one lock acquisition, the same atomicity
	/// `process_scan` gets for a single scan. The returned `bool` is whether
	/// this call actually processed the batch (`true`) versus returning a
	/// cached response for a `batch_id` already seen (`false`) — callers use
	/// it to avoid re-emitting `batch:ack` on a repeat submission.
	pub async fn submit_offline_batch(&self, offline_queue: &OfflineQueueService, batch_id: &str, requests: Vec<ScanRequest>) -> Result<(BatchResponse, bool)> {
		let mut guard = self.current.write().await;
		let session = guard.as_mut().ok_or(SessionError::NoCurrentSession)?;
		let (response, is_fresh) = offline_queue.submit_batch_checked(batch_id, requests, &self.transactions, session)?;
		let snapshot = session.clone();
		drop(guard);
		self.persist(&snapshot).await?;
		Ok((response, is_fresh))
	}

	/// Drains whichever offline queues are non-empty against the live
	/// session, matching `process_queue`'s own signature when no session is
	/// current (startup, or between games) with a `None` session.
	pub async fn drain_offline_queue(&self, offline_queue: &OfflineQueueService) -> Result<()> {
		let mut guard = self.current.write().await;
		offline_queue.process_queue(self.persistence.as_ref(), &self.transactions, guard.as_mut()).await?;
		if let Some(session) = guard.as_ref() {
			let snapshot = session.clone();
			drop(guard);
			self.persist(&snapshot).await?;
		}
		Ok(())
	}

	/// Startup recovery: load `session:current`, restore the clock from its
	/// persisted state, and rebuild transaction-service derived state.
	pub async fn restore_from_persistence(&self) -> Result<()> {
		let Some(mut session) = self.persistence.load_json::<Session>(keys::SESSION_CURRENT).await? else { return Ok(()) };
		if let Some(clock_state) = session.game_clock.clone() {
			self.clock.restore(clock_state).await;
		}
		self.transactions.restore_from_session(&mut session);
		if session.status == SessionStatus::Active {
			self.arm_overtime_timer(&session.id).await;
		}
		*self.current.write().await = Some(session);
		Ok(())
	}

	async fn persist(&self, session: &Session) -> Result<()> {
		let mut with_clock = session.clone();
		with_clock.game_clock = Some(self.clock.snapshot().await);
		self.persistence.save_json(&keys::session(&with_clock.id), &with_clock).await?;
		self.persistence.save_json(keys::SESSION_CURRENT, &with_clock).await?;
		Ok(())
	}

	async fn archive(&self, session: &Session) -> Result<()> {
		self.persistence.save_json(&keys::archive_session(&session.id), session).await?;
		self.persistence.save_json(&keys::backup_session(&session.id, &Utc::now()), session).await?;
		Ok(())
	}

	async fn cancel_overtime_timer(&self) {
		if let Some(token) = self.overtime_timer.write().await.take() {
			token.cancel();
		}
	}

	/// Session-level expected-duration warning (§4.3, kept independent from
	/// `GameClock`'s own overtime per §9's resolved open question): fires
	/// `session:overtime` at most once, never ends the session.
	async fn arm_overtime_timer(&self, session_id: &str) {
		self.cancel_overtime_timer().await;
		let Some(expected_secs) = self.expected_duration_secs else { return };

		let token = CancellationToken::new();
		*self.overtime_timer.write().await = Some(token.clone());

		let bus = self.bus.clone();
		let session_id = session_id.to_string();
		tokio::spawn(async move {
			tokio::select! {
				_ = token.cancelled() => {}
				() = tokio::time::sleep(Duration::from_secs(u64::try_from(expected_secs.max(0)).unwrap_or(u64::MAX))) => {
					bus.publish(DomainEvent::SessionOvertime { session_id });
				}
			}
		});
	}
}
