use aln_broadcast::VideoStatus;
use aln_types::{DeviceSummary, SessionMetadata, SessionStatus, TeamId, TeamScore, Transaction};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `recentTransactions` is capped at this many entries (§4.12), most recent
/// first, regardless of how many the session actually holds.
pub const MAX_RECENT_TRANSACTIONS: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub id: String,
	pub name: String,
	pub status: SessionStatus,
	pub start_time: DateTime<Utc>,
	pub end_time: Option<DateTime<Utc>>,
	pub teams: Vec<TeamId>,
	pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorStatus {
	Online,
	Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VlcStatus {
	Connected,
	Disconnected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
	pub orchestrator: OrchestratorStatus,
	pub vlc: VlcStatus,
	pub offline: bool,
}

/// The `sync:full` payload (§4.12): everything a freshly-attached GM console
/// needs to render immediately, without waiting on a stream of individual
/// domain events to catch it up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
	pub session: Option<SessionSummary>,
	pub scores: Vec<TeamScore>,
	pub recent_transactions: Vec<Transaction>,
	pub video_status: VideoStatus,
	pub devices: Vec<DeviceSummary>,
	pub system_status: SystemStatus,
}

/// Most recent `limit` transactions, most-recent-first. `Session.transactions`
/// is append-ordered (oldest first), so this reverses and truncates rather
/// than assuming any particular storage order upstream.
#[must_use]
pub fn most_recent(transactions: &[Transaction], limit: usize) -> Vec<Transaction> {
	transactions.iter().rev().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use aln_types::{DeviceType, TransactionMode, TransactionStatus};

	fn tx(id: &str) -> Transaction {
		Transaction {
			id: id.into(),
			session_id: "s1".into(),
			token_id: "t1".into(),
			team_id: "team-a".into(),
			device_id: "gm1".into(),
			device_type: DeviceType::Gm,
			mode: TransactionMode::Detective,
			points: 0,
			status: TransactionStatus::Accepted,
			rejection_reason: None,
			original_transaction_id: None,
			timestamp: Utc::now(),
		}
	}

	#[test]
	fn most_recent_reverses_and_caps() {
		let all: Vec<Transaction> = (0..5).map(|i| tx(&i.to_string())).collect();
		let recent = most_recent(&all, 3);
		assert_eq!(recent.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["4", "3", "2"]);
	}

	#[test]
	fn most_recent_is_not_confused_by_a_short_list() {
		let all = vec![tx("only")];
		let recent = most_recent(&all, MAX_RECENT_TRANSACTIONS);
		assert_eq!(recent.len(), 1);
	}
}
