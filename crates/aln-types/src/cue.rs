use crate::CueId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
	Eq,
	Neq,
	Gt,
	Gte,
	Lt,
	Lte,
	In,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueCondition {
	pub field: String,
	pub op: ConditionOp,
	pub value: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueTrigger {
	pub event: Option<String>,
	/// "HH:MM:SS" offset from game-clock zero.
	pub clock: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueCommand {
	pub action: String,
	#[serde(default)]
	pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
	/// Seconds from cue start; entries at `at <= 0` fire immediately on cue start.
	pub at: i64,
	pub action: String,
	#[serde(default)]
	pub payload: Value,
}

/// Per-stream routing defaults, keyed by `streamType` (`action.split(':')[0]`).
pub type RoutingTable = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CueBody {
	Commands(Vec<CueCommand>),
	Timeline(Vec<TimelineEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueDefinition {
	pub id: CueId,
	pub label: String,
	pub icon: Option<String>,
	#[serde(default)]
	pub quick_fire: bool,
	#[serde(default)]
	pub once: bool,
	pub trigger: Option<CueTrigger>,
	#[serde(default)]
	pub conditions: Vec<CueCondition>,
	pub body: CueBody,
	#[serde(default)]
	pub routing: RoutingTable,
}

impl CueDefinition {
	#[must_use]
	pub fn is_standing(&self) -> bool {
		self.trigger.is_some()
	}

	#[must_use]
	pub fn is_compound(&self) -> bool {
		matches!(self.body, CueBody::Timeline(_))
	}

	/// `hasVideo` per §4.9: the timeline contains a `video:play` or `video:queue:add`.
	#[must_use]
	pub fn has_video(&self) -> bool {
		match &self.body {
			CueBody::Timeline(entries) => entries.iter().any(|e| e.action == "video:play" || e.action == "video:queue:add"),
			CueBody::Commands(_) => false,
		}
	}

	/// `maxAt = max(timeline.at, 0)`; zero-length timelines complete immediately.
	#[must_use]
	pub fn max_at(&self) -> i64 {
		match &self.body {
			CueBody::Timeline(entries) => entries.iter().map(|e| e.at).max().unwrap_or(0).max(0),
			CueBody::Commands(_) => 0,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundCueState {
	Running,
	Paused,
	Stopped,
}

/// Runtime record for a currently-active compound (timeline) cue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCompoundCue {
	pub cue_id: CueId,
	pub state: CompoundCueState,
	pub start_elapsed: i64,
	pub elapsed: i64,
	pub fired_entries: BTreeSet<usize>,
	pub max_at: i64,
	pub has_video: bool,
	pub parent_chain: Vec<CueId>,
	pub children: Vec<CueId>,
}

impl ActiveCompoundCue {
	#[must_use]
	pub fn new(cue_id: CueId, start_elapsed: i64, max_at: i64, has_video: bool, parent_chain: Vec<CueId>) -> Self {
		Self {
			cue_id,
			state: CompoundCueState::Running,
			start_elapsed,
			elapsed: 0,
			fired_entries: BTreeSet::new(),
			max_at,
			has_video,
			parent_chain,
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn is_complete(&self, entry_count: usize) -> bool {
		self.fired_entries.len() >= entry_count && self.elapsed >= self.max_at
	}
}
