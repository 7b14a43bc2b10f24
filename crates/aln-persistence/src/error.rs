use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// §7's `persistence` taxonomy entry: storage write failures are logged and
/// surfaced to the caller, but never unwound past the service boundary —
/// callers match on this to decide whether to keep running on stale state.
#[derive(Debug, Error)]
pub enum PersistenceError {
	#[error("key not found: {0}")]
	NotFound(String),
	#[error("io error on key {key}: {source}")]
	Io { key: String, #[source] source: std::io::Error },
	#[error("serialization error on key {key}: {source}")]
	Serde { key: String, #[source] source: serde_json::Error },
}

impl PersistenceError {
	/// Whether the caller should keep running on the in-memory state it already
	/// has (true for every variant here — persistence failures never abort the
	/// process, per §7).
	#[must_use]
	pub fn is_recoverable(&self) -> bool {
		true
	}
}
