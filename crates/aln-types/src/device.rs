use crate::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
	Gm,
	Player,
	Esp32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
	pub device_id: DeviceId,
	pub kind: ConsoleKind,
	pub connected: bool,
	pub connected_at: DateTime<Utc>,
	pub last_heartbeat: DateTime<Utc>,
}
