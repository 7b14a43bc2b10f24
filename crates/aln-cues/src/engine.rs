use crate::command::CommandSink;
use crate::condition::{conditions_match, normalize_payload, parse_hhmmss};
use crate::error::{CueEngineError, Result};
use aln_catalog::TokenCatalog;
use aln_clock::GameClock;
use aln_event_bus::EventBus;
use aln_types::{ActiveCompoundCue, CompoundCueState, CueBody, CueDefinition, CueId, DomainEvent, RoutingTable, TimelineEntry};
use aln_video::VideoQueueService;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// §4.9 `fireCue`'s depth cap — bounds cue→cue nesting via `parentChain`.
pub const MAX_NESTING_DEPTH: usize = 5;

/// Auto-cancel window for an unresolved video conflict (§4.9 D13, §5).
pub const CONFLICT_AUTO_CANCEL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
	Override,
	Cancel,
}

#[derive(Debug, Clone)]
struct PendingConflict {
	def: CueDefinition,
	trigger: Value,
	parent_chain: Vec<CueId>,
}

#[derive(Debug, Clone)]
pub struct ActiveCueSnapshot {
	pub cue_id: CueId,
	pub state: CompoundCueState,
	pub progress: i64,
	pub duration: i64,
}

struct Inner {
	bus: EventBus,
	clock: Arc<GameClock>,
	video: Arc<VideoQueueService>,
	catalog: Arc<TokenCatalog>,
	sink: Arc<dyn CommandSink>,
	default_routing: RoutingTable,
	definitions: RwLock<Vec<CueDefinition>>,
	disabled: RwLock<HashSet<CueId>>,
	fired_clock_cues: RwLock<HashSet<CueId>>,
	active: RwLock<HashMap<CueId, ActiveCompoundCue>>,
	conflict_timers: RwLock<HashMap<CueId, CancellationToken>>,
	pending_conflicts: RwLock<HashMap<CueId, PendingConflict>>,
	is_active: AtomicBool,
}

/// The cue engine (§4.9): loads a venue's cue set, evaluates standing cues
/// against both the event bus and the game clock, and drives simple and
/// compound (timeline) cue firing. Single-writer over `active`/
/// `firedClockCues`/`conflictTimers`/`pendingConflicts` per §5 — every
/// mutation below takes the corresponding lock for the whole step, not
/// read-then-write across an await point.
#[derive(Clone)]
pub struct CueEngine {
	inner: Arc<Inner>,
}

impl CueEngine {
	#[must_use]
	pub fn new(bus: EventBus, clock: Arc<GameClock>, video: Arc<VideoQueueService>, catalog: Arc<TokenCatalog>, sink: Arc<dyn CommandSink>, default_routing: RoutingTable) -> Self {
		Self {
			inner: Arc::new(Inner {
				bus,
				clock,
				video,
				catalog,
				sink,
				default_routing,
				definitions: RwLock::new(Vec::new()),
				disabled: RwLock::new(HashSet::new()),
				fired_clock_cues: RwLock::new(HashSet::new()),
				active: RwLock::new(HashMap::new()),
				conflict_timers: RwLock::new(HashMap::new()),
				pending_conflicts: RwLock::new(HashMap::new()),
				is_active: AtomicBool::new(true),
			}),
		}
	}

	pub fn activate(&self) {
		self.inner.is_active.store(true, Ordering::SeqCst);
	}

	pub fn suspend(&self) {
		self.inner.is_active.store(false, Ordering::SeqCst);
	}

	#[must_use]
	pub fn is_active(&self) -> bool {
		self.inner.is_active.load(Ordering::SeqCst)
	}

	/// `loadCues(array)`: stops every currently-running compound cue first,
	/// then replaces the definition set and clears the per-set runtime
	/// bookkeeping (`disabled`, `firedClockCues`) that only makes sense for
	/// the cues that were just replaced.
	pub async fn load_cues(&self, cues: Vec<CueDefinition>) {
		let active_ids: Vec<CueId> = self.inner.active.read().await.keys().cloned().collect();
		for id in active_ids {
			self.stop_cue(&id).await;
		}
		*self.inner.definitions.write().await = cues;
		self.inner.disabled.write().await.clear();
		self.inner.fired_clock_cues.write().await.clear();
	}

	pub async fn enable_cue(&self, id: &str) {
		self.inner.disabled.write().await.remove(id);
	}

	pub async fn disable_cue(&self, id: &str) {
		self.inner.disabled.write().await.insert(id.to_string());
	}

	async fn find_definition(&self, id: &str) -> Option<CueDefinition> {
		self.inner.definitions.read().await.iter().find(|d| d.id == id).cloned()
	}

	/// `handleGameEvent(eventName, payload)` (§4.9 event path).
	pub async fn handle_game_event(&self, event_name: &str, payload: Value) {
		if !self.is_active() {
			return;
		}
		let ctx = normalize_payload(event_name, &payload, &self.inner.catalog);
		let defs = self.inner.definitions.read().await.clone();
		for def in defs {
			if def.trigger.as_ref().and_then(|t| t.event.as_deref()) != Some(event_name) {
				continue;
			}
			if self.inner.disabled.read().await.contains(&def.id) {
				continue;
			}
			if !conditions_match(&def.conditions, &ctx) {
				continue;
			}
			let _ = self.fire_cue(&def.id, Value::Object(ctx.clone()), Vec::new()).await;
		}
	}

	/// `handleClockTick(elapsedSeconds)` (§4.9 clock path): fires standing
	/// clock cues whose threshold has just been crossed, then advances every
	/// running non-video compound cue.
	pub async fn handle_clock_tick(&self, elapsed: i64) {
		if !self.is_active() {
			return;
		}
		let defs = self.inner.definitions.read().await.clone();
		for def in &defs {
			if self.inner.disabled.read().await.contains(&def.id) {
				continue;
			}
			let Some(threshold) = def.trigger.as_ref().and_then(|t| t.clock.as_deref()).and_then(parse_hhmmss) else { continue };
			let already_fired = self.inner.fired_clock_cues.read().await.contains(&def.id);
			if elapsed >= threshold && !already_fired {
				self.inner.fired_clock_cues.write().await.insert(def.id.clone());
				let _ = self.fire_cue(&def.id, json!({"clock": def.trigger.as_ref().and_then(|t| t.clock.clone())}), Vec::new()).await;
			}
		}

		let clock_driven_ids: Vec<CueId> = {
			let active = self.inner.active.read().await;
			active.iter().filter(|(_, c)| !c.has_video && c.state == CompoundCueState::Running).map(|(id, _)| id.clone()).collect()
		};
		for id in clock_driven_ids {
			self.advance_clock_driven(&id, elapsed).await;
		}
	}

	async fn advance_clock_driven(&self, id: &str, tick_elapsed: i64) {
		let Some(def) = self.find_definition(id).await else { return };
		let CueBody::Timeline(entries) = &def.body else { return };

		let elapsed = {
			let mut active = self.inner.active.write().await;
			let Some(cue) = active.get_mut(id) else { return };
			cue.elapsed = tick_elapsed - cue.start_elapsed;
			cue.elapsed
		};
		self.fire_timeline_entries(id, entries, elapsed, &def).await;
		self.emit_status(id).await;
		self.complete_if_done(id, entries.len()).await;
	}

	/// Video-driven advance for `hasVideo` compound cues (§4.9): converts
	/// VLC's `0..1` progress ratio to seconds and advances every running
	/// `hasVideo` cue the same way the clock path advances non-video ones.
	pub async fn handle_video_progress(&self, position: f64, duration_secs: u32) {
		if !self.is_active() {
			return;
		}
		let elapsed = (position.clamp(0.0, 1.0) * f64::from(duration_secs)) as i64;
		let ids: Vec<CueId> = {
			let active = self.inner.active.read().await;
			active.iter().filter(|(_, c)| c.has_video && c.state == CompoundCueState::Running).map(|(id, _)| id.clone()).collect()
		};
		for id in ids {
			let Some(def) = self.find_definition(&id).await else { continue };
			let CueBody::Timeline(entries) = &def.body else { continue };
			{
				let mut active = self.inner.active.write().await;
				if let Some(cue) = active.get_mut(&id) {
					cue.elapsed = elapsed;
				}
			}
			self.fire_timeline_entries(&id, entries, elapsed, &def).await;
			self.emit_status(&id).await;
			self.complete_if_done(&id, entries.len()).await;
		}
	}

	pub async fn handle_video_paused(&self) {
		self.transition_video_cues(CompoundCueState::Running, CompoundCueState::Paused).await;
	}

	pub async fn handle_video_resumed(&self) {
		self.transition_video_cues(CompoundCueState::Paused, CompoundCueState::Running).await;
	}

	async fn transition_video_cues(&self, from: CompoundCueState, to: CompoundCueState) {
		let ids: Vec<CueId> = {
			let mut active = self.inner.active.write().await;
			let mut touched = Vec::new();
			for (id, cue) in active.iter_mut() {
				if cue.has_video && cue.state == from {
					cue.state = to;
					touched.push(id.clone());
				}
			}
			touched
		};
		for id in ids {
			self.cascade_state(&id, from, to).await;
			self.emit_status(&id).await;
		}
	}

	/// `video:completed`: jump elapsed straight to `maxAt`, firing whatever
	/// timeline entries remain and driving the cue to completion — a video
	/// cue's natural end is the clip ending, not a clock threshold.
	pub async fn handle_video_completed(&self) {
		let ids: Vec<CueId> = {
			let active = self.inner.active.read().await;
			active.iter().filter(|(_, c)| c.has_video).map(|(id, _)| id.clone()).collect()
		};
		for id in ids {
			let Some(def) = self.find_definition(&id).await else { continue };
			let CueBody::Timeline(entries) = &def.body else { continue };
			let max_at = {
				let mut active = self.inner.active.write().await;
				let Some(cue) = active.get_mut(&id) else { continue };
				cue.elapsed = cue.max_at;
				cue.max_at
			};
			self.fire_timeline_entries(&id, entries, max_at, &def).await;
			self.emit_status(&id).await;
			self.complete_if_done(&id, entries.len()).await;
		}
	}

	/// `fireCue(id, trigger, parentChain?)` (§4.9).
	///
	/// # Errors
	/// [`CueEngineError::UnknownCue`] if `id` names no loaded cue.
	pub async fn fire_cue(&self, id: &str, trigger: Value, parent_chain: Vec<CueId>) -> Result<()> {
		let Some(def) = self.find_definition(id).await else {
			tracing::warn!(cue_id = %id, "fireCue called with an unknown cue id");
			self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message: "unknown cue".into() });
			return Err(CueEngineError::UnknownCue(id.to_string()));
		};
		if self.inner.disabled.read().await.contains(id) {
			return Ok(());
		}
		if parent_chain.iter().any(|p| p == id) {
			self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message: "cycle detected in parent chain".into() });
			return Ok(());
		}
		if def.is_compound() && self.inner.active.read().await.contains_key(id) {
			self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message: "cue is already active".into() });
			return Ok(());
		}
		if parent_chain.len() >= MAX_NESTING_DEPTH {
			self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message: "max nesting depth exceeded".into() });
			return Ok(());
		}

		self.inner.bus.publish(DomainEvent::CueFired { cue_id: id.to_string(), trigger: trigger.clone(), source: "cue".into() });

		match def.body.clone() {
			CueBody::Commands(commands) => {
				for command in &commands {
					let mut payload = command.payload.clone();
					self.resolve_routing(&command.action, &mut payload, &def);
					if let Err(message) = self.inner.sink.execute(&command.action, payload).await {
						self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message });
					}
				}
				self.inner.bus.publish(DomainEvent::CueCompleted { cue_id: id.to_string() });
				if def.once {
					self.inner.disabled.write().await.insert(id.to_string());
				}
			}
			CueBody::Timeline(entries) => {
				self.start_compound_cue(def, entries, trigger, parent_chain).await;
			}
		}
		Ok(())
	}

	async fn start_compound_cue(&self, def: CueDefinition, entries: Vec<TimelineEntry>, trigger: Value, parent_chain: Vec<CueId>) {
		let has_video = def.has_video();
		if has_video && self.inner.video.is_playing() {
			let current_video = self.inner.video.get_current_video().map(|c| c.token_id);
			self.inner.bus.publish(DomainEvent::CueConflict { cue_id: def.id.clone(), reason: "Video conflict".into(), current_video, auto_cancel: true, auto_cancel_ms: 10_000 });
			self.inner.pending_conflicts.write().await.insert(def.id.clone(), PendingConflict { def: def.clone(), trigger, parent_chain });
			self.arm_conflict_timer(def.id.clone()).await;
			return;
		}

		let max_at = def.max_at();
		let start_elapsed = self.inner.clock.elapsed().await;
		let active_cue = ActiveCompoundCue::new(def.id.clone(), start_elapsed, max_at, has_video, parent_chain.clone());
		{
			let mut active = self.inner.active.write().await;
			if let Some(parent_id) = parent_chain.last() {
				if let Some(parent) = active.get_mut(parent_id) {
					parent.children.push(def.id.clone());
				}
			}
			active.insert(def.id.clone(), active_cue);
		}

		self.inner.bus.publish(DomainEvent::CueStarted { cue_id: def.id.clone(), has_video, duration: max_at });
		self.fire_timeline_entries(&def.id, &entries, 0, &def).await;
		self.complete_if_done(&def.id, entries.len()).await;
		if def.once {
			self.inner.disabled.write().await.insert(def.id.clone());
		}
	}

	/// GM-initiated resolution of a stashed video conflict (§4.9 D13):
	/// override stops the current video and starts the stashed cue; cancel
	/// discards it. Both clear the auto-cancel timer and pending entry.
	pub async fn resolve_conflict(&self, cue_id: &str, resolution: ConflictResolution) {
		if let Some(token) = self.inner.conflict_timers.write().await.remove(cue_id) {
			token.cancel();
		}
		let Some(pending) = self.inner.pending_conflicts.write().await.remove(cue_id) else { return };
		if resolution == ConflictResolution::Override {
			self.inner.video.stop_current();
			if let CueBody::Timeline(entries) = pending.def.body.clone() {
				self.start_compound_cue(pending.def, entries, pending.trigger, pending.parent_chain).await;
			}
		}
	}

	async fn arm_conflict_timer(&self, cue_id: CueId) {
		let token = CancellationToken::new();
		self.inner.conflict_timers.write().await.insert(cue_id.clone(), token.clone());
		let engine = self.clone();
		tokio::spawn(async move {
			tokio::select! {
				() = token.cancelled() => {}
				() = tokio::time::sleep(CONFLICT_AUTO_CANCEL) => {
					engine.inner.conflict_timers.write().await.remove(&cue_id);
					engine.inner.pending_conflicts.write().await.remove(&cue_id);
				}
			}
		});
	}

	async fn fire_timeline_entries(&self, id: &str, entries: &[TimelineEntry], elapsed: i64, def: &CueDefinition) {
		let due: Vec<TimelineEntry> = {
			let mut active = self.inner.active.write().await;
			let Some(cue) = active.get_mut(id) else { return };
			let mut due = Vec::new();
			for (index, entry) in entries.iter().enumerate() {
				if entry.at <= elapsed && !cue.fired_entries.contains(&index) {
					cue.fired_entries.insert(index);
					due.push(entry.clone());
				}
			}
			due
		};
		for entry in due {
			let mut payload = entry.payload.clone();
			self.resolve_routing(&entry.action, &mut payload, def);
			if let Err(message) = self.inner.sink.execute(&entry.action, payload).await {
				self.inner.bus.publish(DomainEvent::CueError { cue_id: id.to_string(), message });
			}
		}
	}

	/// `_resolveRouting`: command-level `target` wins outright; otherwise
	/// cue-level `routing[streamType]`, falling back to the engine's global
	/// default for that stream type.
	fn resolve_routing(&self, action: &str, payload: &mut Value, def: &CueDefinition) {
		if payload.get("target").is_some_and(|v| !v.is_null()) {
			return;
		}
		let stream_type = action.split(':').next().unwrap_or(action);
		let Some(target) = def.routing.get(stream_type).or_else(|| self.inner.default_routing.get(stream_type)) else { return };
		match payload {
			Value::Object(map) => {
				map.insert("target".to_string(), Value::String(target.clone()));
			}
			Value::Null => {
				let mut map = Map::new();
				map.insert("target".to_string(), Value::String(target.clone()));
				*payload = Value::Object(map);
			}
			_ => {}
		}
	}

	async fn emit_status(&self, id: &str) {
		let Some((state, progress, duration)) = self.inner.active.read().await.get(id).map(|c| (c.state, c.elapsed, c.max_at)) else { return };
		self.inner.bus.publish(DomainEvent::CueStatus { cue_id: id.to_string(), state, progress, duration });
	}

	async fn complete_if_done(&self, id: &str, entry_count: usize) -> bool {
		let done = self.inner.active.read().await.get(id).is_some_and(|c| c.is_complete(entry_count));
		if done {
			self.inner.active.write().await.remove(id);
			self.inner.bus.publish(DomainEvent::CueCompleted { cue_id: id.to_string() });
			if let Some(def) = self.find_definition(id).await {
				if def.once {
					self.inner.disabled.write().await.insert(id.to_string());
				}
			}
		}
		done
	}

	async fn descendants_of(&self, id: &str) -> Vec<CueId> {
		let active = self.inner.active.read().await;
		let mut result = Vec::new();
		let mut stack = active.get(id).map(|c| c.children.clone()).unwrap_or_default();
		while let Some(current) = stack.pop() {
			if let Some(cue) = active.get(&current) {
				stack.extend(cue.children.iter().cloned());
			}
			result.push(current);
		}
		result
	}

	/// `stopCue(id)`: cascades depth-first to every child before clearing
	/// the cue itself, dropping any armed conflict timer along the way.
	pub async fn stop_cue(&self, id: &str) {
		if let Some(token) = self.inner.conflict_timers.write().await.remove(id) {
			token.cancel();
		}
		self.inner.pending_conflicts.write().await.remove(id);

		let descendants = self.descendants_of(id).await;
		for child in &descendants {
			self.stop_single(child).await;
		}
		self.stop_single(id).await;
	}

	async fn stop_single(&self, id: &str) {
		let removed = self.inner.active.write().await.remove(id);
		let (progress, duration) = removed.map_or((0, 0), |c| (c.elapsed, c.max_at));
		self.inner.bus.publish(DomainEvent::CueStatus { cue_id: id.to_string(), state: CompoundCueState::Stopped, progress, duration });
	}

	/// `pauseCue(id)` / `resumeCue(id)`: cascade running children to paused
	/// (pause) or paused children to running (resume); cues already in the
	/// target state, or in neither relevant state, are left untouched.
	pub async fn pause_cue(&self, id: &str) {
		self.cascade_state(id, CompoundCueState::Running, CompoundCueState::Paused).await;
	}

	pub async fn resume_cue(&self, id: &str) {
		self.cascade_state(id, CompoundCueState::Paused, CompoundCueState::Running).await;
	}

	async fn cascade_state(&self, id: &str, from: CompoundCueState, to: CompoundCueState) {
		let mut ids = self.descendants_of(id).await;
		ids.push(id.to_string());
		{
			let mut active = self.inner.active.write().await;
			for cue_id in &ids {
				if let Some(cue) = active.get_mut(cue_id) {
					if cue.state == from {
						cue.state = to;
					}
				}
			}
		}
		for cue_id in &ids {
			self.emit_status(cue_id).await;
		}
	}

	#[must_use]
	pub async fn active_cues(&self) -> Vec<ActiveCueSnapshot> {
		self.inner.active.read().await.values().map(|c| ActiveCueSnapshot { cue_id: c.cue_id.clone(), state: c.state, progress: c.elapsed, duration: c.max_at }).collect()
	}

	/// Reset: clears cues, disabled set, firedClockCues, conflictTimers
	/// (cancelling each before dropping), pendingConflicts, activeCues.
	pub async fn reset(&self) {
		self.inner.definitions.write().await.clear();
		self.inner.disabled.write().await.clear();
		self.inner.fired_clock_cues.write().await.clear();
		for (_, token) in self.inner.conflict_timers.write().await.drain() {
			token.cancel();
		}
		self.inner.pending_conflicts.write().await.clear();
		self.inner.active.write().await.clear();
	}

	/// Spawn the engine's own event-bus subscription loop, routing clock
	/// ticks and video transitions to their dedicated handlers and every
	/// other event through `handleGameEvent`. D4 is enforced here: cue
	/// engine output events are filtered before reaching either path.
	#[must_use]
	pub fn spawn_event_loop(&self) -> CancellationToken {
		let token = CancellationToken::new();
		let shutdown = token.clone();
		let engine = self.clone();
		let mut subscriber = self.inner.bus.subscribe();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = shutdown.cancelled() => break,
					event = subscriber.recv() => {
						let Some(event) = event else { break };
						engine.dispatch_event(event).await;
					}
				}
			}
		});

		token
	}

	async fn dispatch_event(&self, event: DomainEvent) {
		if event.is_cue_engine_output() {
			return;
		}
		match &event {
			DomainEvent::GameClockTick { elapsed } => self.handle_clock_tick(*elapsed).await,
			DomainEvent::VideoProgress { position, duration_secs, .. } => self.handle_video_progress(*position, *duration_secs).await,
			DomainEvent::VideoPaused { .. } => self.handle_video_paused().await,
			DomainEvent::VideoResumed { .. } => self.handle_video_resumed().await,
			DomainEvent::VideoCompleted { .. } => self.handle_video_completed().await,
			_ => {}
		}
		self.handle_game_event(event.name(), event.data_value()).await;
	}
}
