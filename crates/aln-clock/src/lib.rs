//! The single 1 Hz master tick authority (§4.5).
//!
//! One background task per running clock, started on `start()` and cancelled
//! on `stop()`/`pause()`, running its interval loop against a
//! `CancellationToken` — cooperative shutdown rather than `Drop`-time cleanup
//! the caller has to remember to invoke.
//!
//! `elapsed` is computed from stored timestamps rather than an incrementing
//! counter so it never drifts from wall-clock time under scheduler jitter,
//! and so `restore()` can reconstruct it exactly from persisted state without
//! replaying ticks (§8 property 10, the round-trip/idempotence laws).

pub mod error;

pub use error::{ClockError, Result};

use aln_event_bus::EventBus;
use aln_types::session::PersistedClockState;
use aln_types::DomainEvent;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
	Stopped,
	Running,
	Paused,
}

#[derive(Debug, Clone)]
struct Inner {
	state: ClockState,
	game_start_time: Option<DateTime<Utc>>,
	total_paused_ms: i64,
	paused_at: Option<DateTime<Utc>>,
	overtime_fired: bool,
}

impl Default for Inner {
	fn default() -> Self {
		Self { state: ClockState::Stopped, game_start_time: None, total_paused_ms: 0, paused_at: None, overtime_fired: false }
	}
}

impl Inner {
	/// `floor((reference - gameStartTime - totalPausedMs) / 1000)`, where
	/// `reference` is `pausedAt` while paused and `now` while running — the
	/// exact substitution §4.5 calls for so elapsed time freezes the instant
	/// `pause()` is called.
	fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
		let Some(start) = self.game_start_time else { return 0 };
		let reference = self.paused_at.unwrap_or(now);
		let raw_ms = (reference - start).num_milliseconds() - self.total_paused_ms;
		(raw_ms.max(0)) / 1000
	}
}

/// Overtime fires once per arm of the clock (cleared only by `reset`/a new
/// `start()`), never on every tick past the threshold (§8 boundary behavior).
pub struct GameClock {
	inner: Arc<RwLock<Inner>>,
	overtime_threshold_secs: Option<i64>,
	bus: EventBus,
	ticker_token: Arc<RwLock<Option<CancellationToken>>>,
}

impl GameClock {
	#[must_use]
	pub fn new(bus: EventBus, overtime_threshold_secs: Option<i64>) -> Self {
		Self { inner: Arc::new(RwLock::new(Inner::default())), overtime_threshold_secs, bus, ticker_token: Arc::new(RwLock::new(None)) }
	}

	/// `start()`: `gameStartTime = now`, `totalPausedMs = 0`, status=running,
	/// begins the 1 Hz tick loop.
	pub async fn start(&self) -> Result<()> {
		let mut inner = self.inner.write().await;
		if inner.state == ClockState::Running {
			return Err(ClockError::AlreadyRunning);
		}
		*inner = Inner { state: ClockState::Running, game_start_time: Some(Utc::now()), total_paused_ms: 0, paused_at: None, overtime_fired: false };
		drop(inner);
		self.spawn_ticker().await;
		Ok(())
	}

	/// `pause()`: stops the tick loop and records `pauseStart`.
	pub async fn pause(&self) -> Result<()> {
		let mut inner = self.inner.write().await;
		if inner.state != ClockState::Running {
			return Err(ClockError::NotRunning);
		}
		inner.state = ClockState::Paused;
		inner.paused_at = Some(Utc::now());
		drop(inner);
		self.cancel_ticker().await;
		Ok(())
	}

	/// `resume()`: adds `(now - pauseStart)` to `totalPausedMs` and resumes
	/// the tick loop.
	pub async fn resume(&self) -> Result<()> {
		let mut inner = self.inner.write().await;
		if inner.state != ClockState::Paused {
			return Err(ClockError::NotPaused);
		}
		if let Some(paused_at) = inner.paused_at.take() {
			inner.total_paused_ms += (Utc::now() - paused_at).num_milliseconds();
		}
		inner.state = ClockState::Running;
		drop(inner);
		self.spawn_ticker().await;
		Ok(())
	}

	pub async fn stop(&self) {
		self.cancel_ticker().await;
		*self.inner.write().await = Inner::default();
	}

	#[must_use]
	pub async fn state(&self) -> ClockState {
		self.inner.read().await.state
	}

	#[must_use]
	pub async fn elapsed(&self) -> i64 {
		let inner = self.inner.read().await;
		inner.elapsed_at(Utc::now())
	}

	/// Re-enter running or paused based on whether `pausedAt` is set (§4.5
	/// `restore`). Does not re-fire `overtime_fired` state — a session
	/// restored past the overtime threshold does not re-announce overtime.
	pub async fn restore(&self, persisted: PersistedClockState) {
		let state = if persisted.game_start_time.is_none() {
			ClockState::Stopped
		} else if persisted.paused_at.is_some() {
			ClockState::Paused
		} else {
			ClockState::Running
		};
		*self.inner.write().await =
			Inner { state, game_start_time: persisted.game_start_time, total_paused_ms: persisted.total_paused_ms, paused_at: persisted.paused_at, overtime_fired: persisted.overtime_fired };
		if state == ClockState::Running {
			self.spawn_ticker().await;
		}
	}

	#[must_use]
	pub async fn snapshot(&self) -> PersistedClockState {
		let inner = self.inner.read().await;
		PersistedClockState {
			game_start_time: inner.game_start_time,
			total_paused_ms: inner.total_paused_ms,
			paused_at: inner.paused_at,
			overtime_fired: inner.overtime_fired,
		}
	}

	async fn cancel_ticker(&self) {
		if let Some(token) = self.ticker_token.write().await.take() {
			token.cancel();
		}
	}

	async fn spawn_ticker(&self) {
		self.cancel_ticker().await;
		let token = CancellationToken::new();
		*self.ticker_token.write().await = Some(token.clone());

		let inner = Arc::clone(&self.inner);
		let bus = self.bus.clone();
		let overtime_threshold_secs = self.overtime_threshold_secs;

		tokio::spawn(async move {
			let mut ticker = interval(Duration::from_secs(1));
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = ticker.tick() => {
						let elapsed = {
							let mut guard = inner.write().await;
							let elapsed = guard.elapsed_at(Utc::now());
							if let Some(threshold) = overtime_threshold_secs {
								if !guard.overtime_fired && elapsed >= threshold {
									guard.overtime_fired = true;
									bus.publish(DomainEvent::GameClockOvertime { elapsed });
								}
							}
							elapsed
						};
						bus.publish(DomainEvent::GameClockTick { elapsed });
					}
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn elapsed_is_zero_before_start() {
		let clock = GameClock::new(EventBus::new(16), None);
		assert_eq!(clock.elapsed().await, 0);
	}

	#[tokio::test]
	async fn pause_freezes_elapsed() {
		let clock = GameClock::new(EventBus::new(16), None);
		clock.start().await.unwrap();
		tokio::time::sleep(Duration::from_millis(50)).await;
		clock.pause().await.unwrap();
		let first = clock.elapsed().await;
		tokio::time::sleep(Duration::from_millis(50)).await;
		let second = clock.elapsed().await;
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn illegal_transitions_are_rejected() {
		let clock = GameClock::new(EventBus::new(16), None);
		assert_eq!(clock.pause().await, Err(ClockError::NotRunning));
		assert_eq!(clock.resume().await, Err(ClockError::NotPaused));
	}

	#[tokio::test]
	async fn restore_reenters_paused_state() {
		let clock = GameClock::new(EventBus::new(16), None);
		let now = Utc::now();
		let persisted = PersistedClockState { game_start_time: Some(now - chrono::Duration::seconds(30)), total_paused_ms: 0, paused_at: Some(now), overtime_fired: false };
		clock.restore(persisted).await;
		assert_eq!(clock.state().await, ClockState::Paused);
		assert_eq!(clock.elapsed().await, 30);
	}

	#[tokio::test]
	async fn overtime_fires_once() {
		let bus = EventBus::new(64);
		let mut sub = bus.subscribe();
		let clock = GameClock::new(bus, Some(1));
		clock.start().await.unwrap();
		tokio::time::sleep(Duration::from_millis(2500)).await;
		clock.stop().await;

		let mut overtime_count = 0;
		while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(10), sub.recv()).await {
			if matches!(event, DomainEvent::GameClockOvertime { .. }) {
				overtime_count += 1;
			}
		}
		assert_eq!(overtime_count, 1);
	}
}
