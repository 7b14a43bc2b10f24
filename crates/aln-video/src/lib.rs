//! Single-slot video playback model (§4.7). The transport driver (VLC) is an
//! external collaborator (§1 non-goal); this crate only owns the queue and
//! state machine — `report_progress`/`mark_completed` are the seam an
//! external driver adapter calls into, and `video:*` domain events are how
//! the cue engine (§4.9) and broadcast layer (§4.10) observe it.

pub mod error;

pub use error::{Result, VideoError};

use aln_event_bus::EventBus;
use aln_types::{DomainEvent, Token, TokenId};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
	Loading,
	Playing,
	Paused,
}

#[derive(Debug, Clone)]
pub struct CurrentVideo {
	pub token_id: TokenId,
	pub duration_secs: u32,
	pub status: PlaybackStatus,
	/// VLC-style ratio in `0.0..=1.0`, last value reported through
	/// `report_progress`.
	pub position: f64,
}

#[derive(Debug, Clone)]
pub struct QueueItem {
	pub token_id: TokenId,
	pub duration_secs: u32,
	pub source: String,
}

struct State {
	current: Option<CurrentVideo>,
	queue: VecDeque<QueueItem>,
}

pub struct VideoQueueService {
	bus: EventBus,
	state: Mutex<State>,
}

impl VideoQueueService {
	#[must_use]
	pub fn new(bus: EventBus) -> Self {
		Self { bus, state: Mutex::new(State { current: None, queue: VecDeque::new() }) }
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	#[must_use]
	pub fn is_playing(&self) -> bool {
		matches!(self.lock().current.as_ref().map(|c| c.status), Some(PlaybackStatus::Playing))
	}

	#[must_use]
	pub fn get_current_video(&self) -> Option<CurrentVideo> {
		self.lock().current.clone()
	}

	#[must_use]
	pub fn get_queue_items(&self) -> Vec<QueueItem> {
		self.lock().queue.iter().cloned().collect()
	}

	#[must_use]
	pub fn get_video_duration(&self, token_id: &str) -> Option<u32> {
		let state = self.lock();
		state.current.as_ref().filter(|c| c.token_id == token_id).map(|c| c.duration_secs)
	}

	#[must_use]
	pub fn get_remaining_time(&self) -> Option<u32> {
		let state = self.lock();
		let current = state.current.as_ref()?;
		let elapsed = (current.position.clamp(0.0, 1.0) * f64::from(current.duration_secs)) as u32;
		Some(current.duration_secs.saturating_sub(elapsed))
	}

	/// `addToQueue(token, source)`: starts immediately if the slot is idle,
	/// otherwise appends behind whatever is already queued.
	pub fn add_to_queue(&self, token: &Token, source: String) {
		let mut state = self.lock();
		let item = QueueItem { token_id: token.id.clone(), duration_secs: token.duration_secs.unwrap_or(0), source };
		if state.current.is_none() {
			self.start_locked(&mut state, item);
		} else {
			state.queue.push_back(item);
		}
	}

	/// `POST /api/video/control {action:"play"}` (§6): an unconditional,
	/// admin-initiated play rather than the queue-behind-if-busy behavior of
	/// `add_to_queue`. Conflicts instead of queuing when a slot is occupied —
	/// the caller surfaces that as 409 per §7's `conflict` taxonomy entry.
	///
	/// # Errors
	/// [`VideoError::AlreadyPlaying`] if a video is already current (playing
	/// or paused).
	pub fn play_now(&self, token: &Token, source: String) -> Result<()> {
		let mut state = self.lock();
		if state.current.is_some() {
			return Err(VideoError::AlreadyPlaying);
		}
		let item = QueueItem { token_id: token.id.clone(), duration_secs: token.duration_secs.unwrap_or(0), source };
		self.start_locked(&mut state, item);
		Ok(())
	}

	fn start_locked(&self, state: &mut State, item: QueueItem) {
		self.bus.publish(DomainEvent::VideoLoading { token_id: item.token_id.clone() });
		state.current = Some(CurrentVideo { token_id: item.token_id.clone(), duration_secs: item.duration_secs, status: PlaybackStatus::Playing, position: 0.0 });
		self.bus.publish(DomainEvent::VideoStarted { token_id: item.token_id, duration_secs: item.duration_secs });
	}

	fn advance_queue_locked(&self, state: &mut State) {
		state.current = None;
		match state.queue.pop_front() {
			Some(next) => self.start_locked(state, next),
			None => self.bus.publish(DomainEvent::VideoIdle),
		}
	}

	/// # Errors
	/// [`VideoError::NothingPlaying`] if nothing is currently in the
	/// playing state.
	pub fn pause_current(&self) -> Result<()> {
		let mut state = self.lock();
		let current = state.current.as_mut().ok_or(VideoError::NothingPlaying)?;
		if current.status != PlaybackStatus::Playing {
			return Err(VideoError::NothingPlaying);
		}
		current.status = PlaybackStatus::Paused;
		self.bus.publish(DomainEvent::VideoPaused { token_id: current.token_id.clone() });
		Ok(())
	}

	/// # Errors
	/// [`VideoError::NotPaused`] if the current video is not paused.
	pub fn resume_current(&self) -> Result<()> {
		let mut state = self.lock();
		let current = state.current.as_mut().ok_or(VideoError::NotPaused)?;
		if current.status != PlaybackStatus::Paused {
			return Err(VideoError::NotPaused);
		}
		current.status = PlaybackStatus::Playing;
		self.bus.publish(DomainEvent::VideoResumed { token_id: current.token_id.clone() });
		Ok(())
	}

	/// `skipCurrent()`: stops whatever is current (no `video:completed`,
	/// this is an operator skip, not a natural end) and advances the queue.
	pub fn skip_current(&self) {
		let mut state = self.lock();
		if state.current.is_some() {
			self.advance_queue_locked(&mut state);
		}
	}

	/// `stopCurrent()`: clears the slot without advancing to the next
	/// queued item.
	pub fn stop_current(&self) {
		let mut state = self.lock();
		if let Some(current) = state.current.take() {
			self.bus.publish(DomainEvent::VideoIdle);
			drop(current);
		}
	}

	pub fn clear_queue(&self) {
		self.lock().queue.clear();
	}

	/// The seam an external VLC-progress adapter calls into. `position` is
	/// VLC's native `0.0..=1.0` ratio. Reaching `1.0` transitions through
	/// `video:completed` and advances the queue, matching the video-driven
	/// cue-advance rule in §4.9.
	pub fn report_progress(&self, position: f64) {
		let mut state = self.lock();
		let Some(current) = state.current.as_mut() else { return };
		current.position = position.clamp(0.0, 1.0);
		let token_id = current.token_id.clone();
		let duration_secs = current.duration_secs;

		if (current.position - 1.0).abs() < f64::EPSILON {
			self.bus.publish(DomainEvent::VideoCompleted { token_id });
			self.advance_queue_locked(&mut state);
		} else {
			self.bus.publish(DomainEvent::VideoProgress { token_id, position, duration_secs });
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aln_types::MediaAssets;

	fn token(id: &str, duration: u32) -> Token {
		Token { id: id.to_string(), value: 0, memory_type: "tech".into(), value_rating: 1, group_id: None, group_multiplier: 1, media_assets: MediaAssets::default(), duration_secs: Some(duration) }
	}

	#[test]
	fn enqueue_starts_immediately_when_idle() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		assert!(svc.is_playing());
		assert_eq!(svc.get_current_video().unwrap().token_id, "v1");
	}

	#[test]
	fn second_enqueue_waits_behind_current() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		svc.add_to_queue(&token("v2", 30), "gm".into());
		assert_eq!(svc.get_queue_items().len(), 1);
	}

	#[test]
	fn pause_then_resume_round_trips() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		svc.pause_current().unwrap();
		assert!(!svc.is_playing());
		svc.resume_current().unwrap();
		assert!(svc.is_playing());
	}

	#[test]
	fn completion_advances_queue() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		svc.add_to_queue(&token("v2", 30), "gm".into());
		svc.report_progress(1.0);
		assert_eq!(svc.get_current_video().unwrap().token_id, "v2");
	}

	#[test]
	fn skip_advances_without_completion_semantics() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		svc.add_to_queue(&token("v2", 30), "gm".into());
		svc.skip_current();
		assert_eq!(svc.get_current_video().unwrap().token_id, "v2");
	}

	#[test]
	fn stop_clears_without_advancing() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		svc.add_to_queue(&token("v2", 30), "gm".into());
		svc.stop_current();
		assert!(svc.get_current_video().is_none());
		assert_eq!(svc.get_queue_items().len(), 1);
	}

	#[test]
	fn remaining_time_accounts_for_position() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 100), "gm".into());
		svc.report_progress(0.5);
		assert_eq!(svc.get_remaining_time(), Some(50));
	}

	#[test]
	fn play_now_starts_from_idle() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.play_now(&token("v1", 30), "admin".into()).unwrap();
		assert_eq!(svc.get_current_video().unwrap().token_id, "v1");
	}

	#[test]
	fn play_now_conflicts_when_already_playing() {
		let svc = VideoQueueService::new(EventBus::new(16));
		svc.add_to_queue(&token("v1", 30), "gm".into());
		let err = svc.play_now(&token("v2", 30), "admin".into()).unwrap_err();
		assert_eq!(err, VideoError::AlreadyPlaying);
	}
}
