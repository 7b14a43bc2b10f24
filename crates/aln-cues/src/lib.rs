//! Cue engine (§4.9): loads a venue's cue definitions and fires them off
//! in-game events, the game clock, or manual GM trigger, driving simple
//! (commands) and compound (timeline) cues through an external
//! [`CommandSink`].

pub mod command;
pub mod condition;
pub mod engine;
pub mod error;

pub use command::{CommandSink, NoopCommandSink};
pub use engine::{ActiveCueSnapshot, CueEngine, ConflictResolution, MAX_NESTING_DEPTH};
pub use error::{CueEngineError, Result};

#[cfg(test)]
mod tests {
	use super::*;
	use aln_catalog::TokenCatalog;
	use aln_clock::GameClock;
	use aln_event_bus::EventBus;
	use aln_types::{CueBody, CueCommand, CueDefinition, CueTrigger, TimelineEntry};
	use aln_video::VideoQueueService;
	use serde_json::json;
	use std::sync::Arc;

	fn build() -> (CueEngine, Arc<GameClock>, Arc<VideoQueueService>, EventBus) {
		let bus = EventBus::new(256);
		let clock = Arc::new(GameClock::new(bus.clone(), None));
		let video = Arc::new(VideoQueueService::new(bus.clone()));
		let catalog = Arc::new(TokenCatalog::new(vec![]).unwrap());
		let engine = CueEngine::new(bus.clone(), Arc::clone(&clock), Arc::clone(&video), catalog, Arc::new(NoopCommandSink), Default::default());
		(engine, clock, video, bus)
	}

	fn simple_cue(id: &str, once: bool) -> CueDefinition {
		CueDefinition {
			id: id.into(),
			label: "test cue".into(),
			icon: None,
			quick_fire: false,
			once,
			trigger: None,
			conditions: vec![],
			body: CueBody::Commands(vec![CueCommand { action: "lighting:scene:activate".into(), payload: json!({"sceneId": "dim"}) }]),
			routing: Default::default(),
		}
	}

	#[tokio::test]
	async fn simple_cue_fires_commands_and_completes() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		engine.load_cues(vec![simple_cue("c1", false)]).await;
		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();

		let mut saw_fired = false;
		let mut saw_completed = false;
		for _ in 0..4 {
			match tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await {
				Ok(Some(aln_types::DomainEvent::CueFired { cue_id, .. })) if cue_id == "c1" => saw_fired = true,
				Ok(Some(aln_types::DomainEvent::CueCompleted { cue_id })) if cue_id == "c1" => saw_completed = true,
				_ => {}
			}
		}
		assert!(saw_fired && saw_completed);
	}

	#[tokio::test]
	async fn once_cue_disables_itself_after_firing() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		engine.load_cues(vec![simple_cue("c1", true)]).await;
		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		while tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await.is_ok() {}

		// Fired once already; a second direct fire is now silently skipped
		// because the cue auto-disabled itself.
		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		let result = tokio::time::timeout(std::time::Duration::from_millis(30), sub.recv()).await;
		assert!(result.is_err(), "a once-disabled cue must not fire again");

		engine.enable_cue("c1").await;
		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		let event = tokio::time::timeout(std::time::Duration::from_millis(30), sub.recv()).await.unwrap();
		assert!(matches!(event, Some(aln_types::DomainEvent::CueFired { cue_id, .. }) if cue_id == "c1"));
	}

	#[tokio::test]
	async fn unknown_cue_is_an_error() {
		let (engine, _clock, _video, _bus) = build();
		let err = engine.fire_cue("ghost", json!({}), vec![]).await.unwrap_err();
		assert!(matches!(err, CueEngineError::UnknownCue(_)));
	}

	#[tokio::test]
	async fn cycle_in_parent_chain_is_rejected_without_erroring() {
		let (engine, _clock, _video, _bus) = build();
		engine.load_cues(vec![simple_cue("c1", false)]).await;
		let result = engine.fire_cue("c1", json!({}), vec!["c1".into()]).await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn event_path_fires_cue_matching_trigger_and_conditions() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		let mut cue = simple_cue("c1", false);
		cue.trigger = Some(CueTrigger { event: Some("transaction:accepted".into()), clock: None });
		engine.load_cues(vec![cue]).await;

		engine.handle_game_event("transaction:accepted", json!({"transaction": {"tokenId": "t1"}})).await;

		let event = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await.unwrap();
		assert!(matches!(event, Some(aln_types::DomainEvent::CueFired { cue_id, .. }) if cue_id == "c1"));
	}

	#[tokio::test]
	async fn disabled_cue_is_silently_skipped_on_event_path() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		let mut cue = simple_cue("c1", false);
		cue.trigger = Some(CueTrigger { event: Some("transaction:accepted".into()), clock: None });
		engine.load_cues(vec![cue]).await;
		engine.disable_cue("c1").await;

		engine.handle_game_event("transaction:accepted", json!({})).await;
		let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
		assert!(result.is_err(), "a disabled cue must not publish anything");
	}

	#[tokio::test]
	async fn clock_triggered_cue_fires_once_per_activation() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		let mut cue = simple_cue("c1", false);
		cue.trigger = Some(CueTrigger { event: None, clock: Some("00:00:05".into()) });
		engine.load_cues(vec![cue]).await;

		engine.handle_clock_tick(5).await;
		engine.handle_clock_tick(6).await;
		engine.handle_clock_tick(7).await;

		let mut fired_count = 0;
		while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await {
			if matches!(event, aln_types::DomainEvent::CueFired { cue_id, .. } if cue_id == "c1") {
				fired_count += 1;
			}
		}
		assert_eq!(fired_count, 1);
	}

	fn compound_cue(id: &str) -> CueDefinition {
		CueDefinition {
			id: id.into(),
			label: "compound".into(),
			icon: None,
			quick_fire: false,
			once: false,
			trigger: None,
			conditions: vec![],
			body: CueBody::Timeline(vec![
				TimelineEntry { at: 0, action: "video:play".into(), payload: json!({"tokenId": "v1"}) },
				TimelineEntry { at: 30, action: "lighting:scene:activate".into(), payload: json!({"sceneId": "dim"}) },
				TimelineEntry { at: 50, action: "audio:cue:play".into(), payload: json!({"trackId": "sting"}) },
			]),
			routing: Default::default(),
		}
	}

	/// §8 scenario 7: "Compound cue with video sync".
	#[tokio::test]
	async fn compound_cue_with_video_sync_fires_timeline_across_progress_pause_resume_and_completion() {
		let (engine, _clock, video, bus) = build();
		let mut sub = bus.subscribe();
		engine.load_cues(vec![compound_cue("c1")]).await;

		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		assert!(engine.active_cues().await.iter().any(|c| c.cue_id == "c1"));

		engine.handle_video_progress(30.0 / 60.0, 60).await;
		let lighting_fired_at_30s = engine.active_cues().await.iter().find(|c| c.cue_id == "c1").unwrap().progress == 30;
		assert!(lighting_fired_at_30s);

		video.pause_current().unwrap();
		engine.handle_video_paused().await;
		assert_eq!(engine.active_cues().await.iter().find(|c| c.cue_id == "c1").unwrap().state, aln_types::CompoundCueState::Paused);

		video.resume_current().unwrap();
		engine.handle_video_resumed().await;
		assert_eq!(engine.active_cues().await.iter().find(|c| c.cue_id == "c1").unwrap().state, aln_types::CompoundCueState::Running);

		engine.handle_video_completed().await;
		assert!(!engine.active_cues().await.iter().any(|c| c.cue_id == "c1"));

		let mut saw_completed = false;
		while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await {
			if matches!(event, aln_types::DomainEvent::CueCompleted { cue_id } if cue_id == "c1") {
				saw_completed = true;
			}
		}
		assert!(saw_completed);
	}

	#[tokio::test]
	async fn video_conflict_stashes_pending_and_can_be_overridden() {
		let (engine, _clock, video, bus) = build();
		let mut sub = bus.subscribe();
		video.add_to_queue(
			&aln_types::Token { id: "other".into(), value: 0, memory_type: "tech".into(), value_rating: 1, group_id: None, group_multiplier: 1, media_assets: aln_types::MediaAssets::default(), duration_secs: Some(60) },
			"gm".into(),
		);
		engine.load_cues(vec![compound_cue("c1")]).await;

		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		assert!(!engine.active_cues().await.iter().any(|c| c.cue_id == "c1"), "conflicted cue must not start");

		let mut saw_conflict = false;
		while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await {
			if matches!(event, aln_types::DomainEvent::CueConflict { cue_id, .. } if cue_id == "c1") {
				saw_conflict = true;
			}
		}
		assert!(saw_conflict);

		engine.resolve_conflict("c1", ConflictResolution::Override).await;
		assert!(engine.active_cues().await.iter().any(|c| c.cue_id == "c1"));
		assert_eq!(video.get_current_video().unwrap().token_id, "v1");
	}

	#[tokio::test]
	async fn stop_cue_cascades_to_children() {
		let (engine, _clock, _video, _bus) = build();
		// A nested cue spawned under "parent" (e.g. a timeline entry firing
		// another compound cue) registers itself via its own parentChain.
		engine.load_cues(vec![compound_cue("parent"), compound_cue("child")]).await;
		engine.fire_cue("parent", json!({}), vec![]).await.unwrap();
		engine.fire_cue("child", json!({}), vec!["parent".into()]).await.unwrap();

		engine.stop_cue("parent").await;
		let active = engine.active_cues().await;
		assert!(!active.iter().any(|c| c.cue_id == "parent" || c.cue_id == "child"));
	}

	#[tokio::test]
	async fn suspended_engine_ignores_events_and_ticks() {
		let (engine, _clock, _video, bus) = build();
		let mut sub = bus.subscribe();
		let mut cue = simple_cue("c1", false);
		cue.trigger = Some(CueTrigger { event: Some("transaction:accepted".into()), clock: None });
		engine.load_cues(vec![cue]).await;
		engine.suspend();

		engine.handle_game_event("transaction:accepted", json!({})).await;
		let result = tokio::time::timeout(std::time::Duration::from_millis(30), sub.recv()).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn reset_clears_all_runtime_state() {
		let (engine, _clock, _video, _bus) = build();
		engine.load_cues(vec![compound_cue("c1")]).await;
		engine.fire_cue("c1", json!({}), vec![]).await.unwrap();
		assert!(!engine.active_cues().await.is_empty());

		engine.reset().await;
		assert!(engine.active_cues().await.is_empty());
		assert!(engine.fire_cue("c1", json!({}), vec![]).await.is_err());
	}
}
