use crate::cue::CompoundCueState;
use crate::device::ConsoleKind;
use crate::session::Session;
use crate::team_score::TeamScore;
use crate::transaction::Transaction;
use crate::{CueId, DeviceId, GroupId, SessionId, TeamId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device-token scan bookkeeping attached to `transaction:accepted`, per §4.3's
/// "new-format payload that carries teamScore & deviceTracking".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTracking {
	pub device_id: DeviceId,
	pub token_id: TokenId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBonus {
	pub team_id: TeamId,
	pub group_id: GroupId,
	pub multiplier: u32,
	pub bonus: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPlaybackStatus {
	Idle,
	Loading,
	Playing,
	Paused,
}

/// The closed set of in-process domain events (§3 "DomainEvent (in-process,
/// ambient addition)"). Every service publishes a variant of this enum, never a
/// raw string name + JSON blob; the broadcast layer is the only place a
/// `DomainEvent` is turned into a wire-level `EventEnvelope`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
	SessionCreated(Session),
	SessionUpdated(Session),
	SessionOvertime { session_id: SessionId },

	TransactionAccepted {
		transaction: Transaction,
		team_score: TeamScore,
		device_tracking: DeviceTracking,
		group_bonus: Option<GroupBonus>,
	},
	TransactionDuplicate { transaction: Transaction, claimed_by: TeamId, original_transaction_id: String },
	TransactionRejected { transaction: Transaction, reason: String },
	TransactionDeleted { transaction_id: String, token_id: TokenId, team_id: TeamId, updated_team_score: TeamScore },

	ScoreUpdated(TeamScore),
	ScoreAdjusted { team_score: TeamScore, reason: String, is_admin_action: bool },
	ScoresReset { session_id: SessionId },
	GroupCompleted(GroupBonus),

	VideoLoading { token_id: TokenId },
	VideoStarted { token_id: TokenId, duration_secs: u32 },
	VideoPaused { token_id: TokenId },
	VideoResumed { token_id: TokenId },
	VideoProgress { token_id: TokenId, position: f64, duration_secs: u32 },
	VideoCompleted { token_id: TokenId },
	VideoIdle,

	CueFired { cue_id: CueId, trigger: Value, source: String },
	CueStarted { cue_id: CueId, has_video: bool, duration: i64 },
	CueStatus { cue_id: CueId, state: CompoundCueState, progress: i64, duration: i64 },
	CueCompleted { cue_id: CueId },
	CueError { cue_id: CueId, message: String },
	CueConflict { cue_id: CueId, reason: String, current_video: Option<TokenId>, auto_cancel: bool, auto_cancel_ms: u64 },

	DeviceConnected { device_id: DeviceId, kind: ConsoleKind },
	DeviceDisconnected { device_id: DeviceId, kind: ConsoleKind, reason: String, at: DateTime<Utc> },

	ScanLogged { token_id: TokenId, device_id: DeviceId },
	OfflineQueueProcessed { queue_size: usize, processed: usize, failed: usize },

	GameClockTick { elapsed: i64 },
	GameClockOvertime { elapsed: i64 },
}

impl DomainEvent {
	/// The wire event name, matching the server-to-client event vocabulary in §6.
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			DomainEvent::SessionCreated(_) => "session:created",
			DomainEvent::SessionUpdated(_) => "session:updated",
			DomainEvent::SessionOvertime { .. } => "session:overtime",
			DomainEvent::TransactionAccepted { .. } => "transaction:accepted",
			DomainEvent::TransactionDuplicate { .. } => "transaction:duplicate",
			DomainEvent::TransactionRejected { .. } => "transaction:rejected",
			DomainEvent::TransactionDeleted { .. } => "transaction:deleted",
			DomainEvent::ScoreUpdated(_) => "score:updated",
			DomainEvent::ScoreAdjusted { .. } => "score:adjusted",
			DomainEvent::ScoresReset { .. } => "scores:reset",
			DomainEvent::GroupCompleted(_) => "group:completed",
			DomainEvent::VideoLoading { .. } => "video:loading",
			DomainEvent::VideoStarted { .. } => "video:started",
			DomainEvent::VideoPaused { .. } => "video:paused",
			DomainEvent::VideoResumed { .. } => "video:resumed",
			DomainEvent::VideoProgress { .. } => "video:progress",
			DomainEvent::VideoCompleted { .. } => "video:completed",
			DomainEvent::VideoIdle => "video:idle",
			DomainEvent::CueFired { .. } => "cue:fired",
			DomainEvent::CueStarted { .. } => "cue:started",
			DomainEvent::CueStatus { .. } => "cue:status",
			DomainEvent::CueCompleted { .. } => "cue:completed",
			DomainEvent::CueError { .. } => "cue:error",
			DomainEvent::CueConflict { .. } => "cue:conflict",
			DomainEvent::DeviceConnected { .. } => "device:connected",
			DomainEvent::DeviceDisconnected { .. } => "device:disconnected",
			DomainEvent::ScanLogged { .. } => "scan:logged",
			DomainEvent::OfflineQueueProcessed { .. } => "offline:queue:processed",
			DomainEvent::GameClockTick { .. } => "gameclock:tick",
			DomainEvent::GameClockOvertime { .. } => "gameclock:overtime",
		}
	}

	/// D4: events produced by the cue engine's own dispatch path never feed back
	/// into cue evaluation. The cue engine's event subscription filters these out
	/// before they ever reach `handleGameEvent`.
	#[must_use]
	pub fn is_cue_engine_output(&self) -> bool {
		matches!(
			self,
			DomainEvent::CueFired { .. }
				| DomainEvent::CueStarted { .. }
				| DomainEvent::CueStatus { .. }
				| DomainEvent::CueCompleted { .. }
				| DomainEvent::CueError { .. }
				| DomainEvent::CueConflict { .. }
		)
	}
}

/// The one shape that crosses the process boundary (§3). Built exclusively by
/// the broadcast layer — nothing upstream of it constructs one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
	pub event: String,
	pub data: Value,
	pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
	/// # Panics
	/// Panics if `event`'s payload is not representable as JSON, which cannot
	/// happen for any variant defined in this crate.
	#[must_use]
	pub fn wrap(event: &DomainEvent) -> Self {
		Self {
			event: event.name().to_string(),
			data: event.data_value(),
			timestamp: Utc::now(),
		}
	}
}

impl DomainEvent {
	/// The unwrapped payload, stripped of the enum's own externally-tagged
	/// variant key — `DomainEvent` is a Rust-side tagging mechanism only; it
	/// never crosses the wire itself, `EventEnvelope` does.
	#[must_use]
	pub fn data_value(&self) -> Value {
		match serde_json::to_value(self).expect("DomainEvent variants are always JSON-serializable") {
			Value::Object(map) => map.into_values().next().unwrap_or(Value::Null),
			_ => Value::Null,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn envelope_carries_flat_event_name() {
		let event = DomainEvent::VideoIdle;
		let env = EventEnvelope::wrap(&event);
		assert_eq!(env.event, "video:idle");
	}

	#[test]
	fn cue_engine_output_is_flagged() {
		assert!(DomainEvent::CueFired { cue_id: "c1".into(), trigger: Value::Null, source: "cue".into() }.is_cue_engine_output());
		assert!(!DomainEvent::VideoIdle.is_cue_engine_output());
	}
}
