use clap::Parser;

/// Startup configuration (§4.13): one field per environment knob named in
/// §6, each overridable at the command line or through its `env` variable —
/// a single `clap::Parser` struct rather than a scattered collection of
/// `std::env::var` calls.
#[derive(Debug, Clone, Parser)]
#[command(name = "aln-orchestrator", about = "Live-event orchestrator: sessions, scoring, cues, video, and consoles.")]
pub struct OrchestratorConfig {
	/// `memory` keeps no state across restarts; `file` persists under `data_dir`.
	#[arg(long, env = "ALN_STORAGE_TYPE", default_value = "memory")]
	pub storage_type: StorageType,

	#[arg(long, env = "ALN_DATA_DIR", default_value = "./data")]
	pub data_dir: String,

	/// Minutes after game start at which `session:overtime` fires once. `0`
	/// disables the warning entirely.
	#[arg(long, env = "ALN_SESSION_TIMEOUT_MINUTES", default_value_t = 20)]
	pub session_timeout_minutes: i64,

	#[arg(long, env = "ALN_MAX_GM_STATIONS", default_value_t = 8)]
	pub max_gm_stations: usize,

	#[arg(long, env = "ALN_RECENT_TRANSACTIONS_COUNT", default_value_t = 100)]
	pub recent_transactions_count: usize,

	#[arg(long, env = "ALN_MAX_OFFLINE_QUEUE_SIZE", default_value_t = 100)]
	pub max_offline_queue_size: usize,

	/// HTTP heartbeat timeout, in seconds, before a player/esp32 console is
	/// considered disconnected (§4.11).
	#[arg(long, env = "ALN_HEARTBEAT_TIMEOUT_SECS", default_value_t = 30)]
	pub heartbeat_timeout_secs: u64,

	#[arg(long, env = "ALN_VIDEO_PLAYBACK_ENABLED", default_value_t = true)]
	pub video_playback_enabled: bool,

	#[arg(long, env = "ALN_BIND_ADDR", default_value = "0.0.0.0:8080")]
	pub bind_addr: String,

	/// Threaded through to the (unimplemented) admin-auth surface only —
	/// no hashing or verification logic is built here, per the non-goals.
	#[arg(long, env = "ALN_ADMIN_PASSWORD", default_value = "")]
	pub admin_password: String,

	#[arg(long, env = "ALN_VLC_HOST", default_value = "")]
	pub vlc_host: String,

	#[arg(long, env = "ALN_VLC_PASSWORD", default_value = "")]
	pub vlc_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
	Memory,
	File,
}

impl std::str::FromStr for StorageType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"memory" => Ok(Self::Memory),
			"file" => Ok(Self::File),
			other => Err(format!("unknown storage type: {other}")),
		}
	}
}

impl OrchestratorConfig {
	/// Fast timeouts and small limits for unit/integration tests.
	#[cfg(test)]
	#[must_use]
	pub fn test() -> Self {
		Self {
			storage_type: StorageType::Memory,
			data_dir: "./data-test".into(),
			session_timeout_minutes: 0,
			max_gm_stations: 4,
			recent_transactions_count: 10,
			max_offline_queue_size: 5,
			heartbeat_timeout_secs: 2,
			video_playback_enabled: true,
			bind_addr: "127.0.0.1:0".into(),
			admin_password: "test".into(),
			vlc_host: String::new(),
			vlc_password: String::new(),
		}
	}
}
