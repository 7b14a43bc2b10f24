//! Blob persistence for the ALN orchestrator (§4.1).
//!
//! One trait, two backends: [`MemoryStore`] for tests and the `test()`
//! configuration profile, [`FileStore`] for a running venue. Backend choice is
//! a startup decision made by the composition root, never branched on at
//! call sites.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{PersistenceError, Result};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::Persistence;

/// Conventional key prefixes (§6), gathered in one place so a typo in a
/// prefix string is a compile error everywhere but the literal itself.
pub mod keys {
	#[must_use]
	pub fn session(id: &str) -> String {
		format!("session:{id}")
	}

	pub const SESSION_CURRENT: &str = "session:current";

	#[must_use]
	pub fn archive_session(id: &str) -> String {
		format!("archive:session:{id}")
	}

	/// Timestamp has its colons replaced with dashes per §6's naming
	/// convention, so the key itself never needs colon-escaping.
	#[must_use]
	pub fn backup_session(id: &str, timestamp: &chrono::DateTime<chrono::Utc>) -> String {
		let stamp = timestamp.to_rfc3339().replace(':', "-");
		format!("backup:session:{id}:{stamp}")
	}

	pub const CONFIG_ADMIN: &str = "config:admin";
	pub const TOKENS_ALL: &str = "tokens:all";
	pub const OFFLINE_QUEUE: &str = "offlineQueue";
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backup_key_has_no_extra_colons_in_timestamp() {
		let ts = chrono::DateTime::parse_from_rfc3339("2026-07-29T12:00:00Z").unwrap().with_timezone(&chrono::Utc);
		let key = keys::backup_session("s1", &ts);
		assert!(key.starts_with("backup:session:s1:"));
		assert_eq!(key.matches(':').count(), 3);
	}
}
