use crate::team_score::TeamScore;
use crate::transaction::Transaction;
use crate::{DeviceId, SessionId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
	Setup,
	Active,
	Paused,
	Ended,
}

impl SessionStatus {
	/// Legality table for `updateSessionStatus`. Pure: no clock, no cue engine, no I/O.
	pub fn can_transition_to(self, next: SessionStatus) -> bool {
		use SessionStatus::{Active, Ended, Paused, Setup};
		matches!(
			(self, next),
			(Setup, Active) | (Active, Paused) | (Paused, Active) | (Active, Ended) | (Paused, Ended)
		)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
	pub total_scans: u64,
	pub total_accepted: u64,
	pub total_duplicate: u64,
	pub total_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedClockState {
	pub game_start_time: Option<DateTime<Utc>>,
	pub total_paused_ms: i64,
	pub paused_at: Option<DateTime<Utc>>,
	pub overtime_fired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub id: SessionId,
	pub name: String,
	pub status: SessionStatus,
	pub start_time: DateTime<Utc>,
	pub end_time: Option<DateTime<Utc>>,
	pub game_start_time: Option<DateTime<Utc>>,
	pub scores: Vec<TeamScore>,
	pub transactions: Vec<Transaction>,
	pub connected_devices: Vec<DeviceId>,
	pub metadata: SessionMetadata,
	pub game_clock: Option<PersistedClockState>,
	/// (deviceId, tokenId) pairs a GM device has scanned this session — the
	/// per-device duplicate check in step 4a of `processScan`.
	pub device_token_scans: BTreeMap<DeviceId, Vec<String>>,
}

impl Session {
	#[must_use]
	pub fn new(id: SessionId, name: String, teams: &[TeamId]) -> Self {
		Self {
			id,
			name,
			status: SessionStatus::Active,
			start_time: Utc::now(),
			end_time: None,
			game_start_time: Some(Utc::now()),
			scores: teams.iter().cloned().map(TeamScore::new).collect(),
			transactions: Vec::new(),
			connected_devices: Vec::new(),
			metadata: SessionMetadata::default(),
			game_clock: None,
			device_token_scans: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn team_score(&self, team_id: &str) -> Option<&TeamScore> {
		self.scores.iter().find(|s| s.team_id == team_id)
	}

	#[must_use]
	pub fn has_team(&self, team_id: &str) -> bool {
		self.scores.iter().any(|s| s.team_id == team_id)
	}

	/// Accepted transactions for `team_id` that claimed a token, used by group
	/// completion to compute the claimed-token-id set.
	#[must_use]
	pub fn accepted_token_ids_for_team(&self, team_id: &str) -> std::collections::HashSet<String> {
		self
			.transactions
			.iter()
			.filter(|t| t.team_id == team_id && t.status == crate::transaction::TransactionStatus::Accepted)
			.map(|t| t.token_id.clone())
			.collect()
	}

	pub fn record_device_token_scan(&mut self, device_id: &str, token_id: &str) {
		let entry = self.device_token_scans.entry(device_id.to_string()).or_default();
		if !entry.iter().any(|t| t == token_id) {
			entry.push(token_id.to_string());
		}
	}

	#[must_use]
	pub fn device_has_scanned(&self, device_id: &str, token_id: &str) -> bool {
		self.device_token_scans.get(device_id).is_some_and(|tokens| tokens.iter().any(|t| t == token_id))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn legal_transitions() {
		assert!(SessionStatus::Setup.can_transition_to(SessionStatus::Active));
		assert!(SessionStatus::Active.can_transition_to(SessionStatus::Paused));
		assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Active));
		assert!(SessionStatus::Active.can_transition_to(SessionStatus::Ended));
		assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Ended));
	}

	#[test]
	fn illegal_transitions_rejected() {
		assert!(!SessionStatus::Setup.can_transition_to(SessionStatus::Ended));
		assert!(!SessionStatus::Ended.can_transition_to(SessionStatus::Active));
		assert!(!SessionStatus::Active.can_transition_to(SessionStatus::Active));
	}

	#[test]
	fn round_trip_json() {
		let session = Session::new("s1".into(), "Game Night".into(), &["Team Alpha".into()]);
		let json = serde_json::to_string(&session).unwrap();
		let back: Session = serde_json::from_str(&json).unwrap();
		assert_eq!(back.id, session.id);
		assert_eq!(back.scores.len(), session.scores.len());
	}
}
