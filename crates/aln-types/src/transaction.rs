use crate::{DeviceId, SessionId, TeamId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	Gm,
	Player,
	Esp32,
}

impl DeviceType {
	/// Steps 4a/4b of `processScan` only apply to GM devices; player/esp32
	/// content-review scans never contest a claim.
	#[must_use]
	pub fn claims_tokens(self) -> bool {
		matches!(self, DeviceType::Gm)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
	Blackmarket,
	Detective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
	Accepted,
	Duplicate,
	Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	pub id: String,
	pub session_id: SessionId,
	pub token_id: TokenId,
	pub team_id: TeamId,
	pub device_id: DeviceId,
	pub device_type: DeviceType,
	pub mode: TransactionMode,
	pub points: i64,
	pub status: TransactionStatus,
	pub rejection_reason: Option<String>,
	pub original_transaction_id: Option<String>,
	pub timestamp: DateTime<Utc>,
}

/// Incoming scan submission, over HTTP or the persistent console protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
	pub transaction_id: Option<String>,
	pub token_id: TokenId,
	pub team_id: TeamId,
	pub device_id: DeviceId,
	pub device_type: DeviceType,
	pub mode: TransactionMode,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_json() {
		let tx = Transaction {
			id: "t1".into(),
			session_id: "s1".into(),
			token_id: "534e2b03".into(),
			team_id: "Team Alpha".into(),
			device_id: "gm1".into(),
			device_type: DeviceType::Gm,
			mode: TransactionMode::Blackmarket,
			points: 5000,
			status: TransactionStatus::Accepted,
			rejection_reason: None,
			original_transaction_id: None,
			timestamp: Utc::now(),
		};
		let json = serde_json::to_string(&tx).unwrap();
		let back: Transaction = serde_json::from_str(&json).unwrap();
		assert_eq!(back.id, tx.id);
		assert_eq!(back.points, tx.points);
	}
}
