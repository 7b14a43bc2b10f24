use crate::transaction::{DeviceType, TransactionMode};
use crate::{DeviceId, TeamId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two disjoint subtypes distinguished by the `queueId` prefix (`scan_` / `gm_`),
/// per §3. Kept as one tagged enum rather than two structs so both queues can be
/// persisted and iterated uniformly while the prefix stays a derived label, not a
/// second source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OfflineQueueItem {
	PlayerScan {
		queue_id: String,
		transaction_id: String,
		queued_at: DateTime<Utc>,
		retry_count: u32,
		token_id: TokenId,
		device_id: DeviceId,
	},
	GmTransaction {
		queue_id: String,
		transaction_id: String,
		queued_at: DateTime<Utc>,
		retry_count: u32,
		token_id: TokenId,
		team_id: TeamId,
		device_id: DeviceId,
		device_type: DeviceType,
		mode: TransactionMode,
	},
}

impl OfflineQueueItem {
	#[must_use]
	pub fn queue_id(&self) -> &str {
		match self {
			OfflineQueueItem::PlayerScan { queue_id, .. } | OfflineQueueItem::GmTransaction { queue_id, .. } => queue_id,
		}
	}

	#[must_use]
	pub fn transaction_id(&self) -> &str {
		match self {
			OfflineQueueItem::PlayerScan { transaction_id, .. } | OfflineQueueItem::GmTransaction { transaction_id, .. } => transaction_id,
		}
	}

	pub fn increment_retry(&mut self) {
		match self {
			OfflineQueueItem::PlayerScan { retry_count, .. } | OfflineQueueItem::GmTransaction { retry_count, .. } => *retry_count += 1,
		}
	}
}
