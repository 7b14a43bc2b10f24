use crate::snapshot::StateSnapshot;
use sha2::{Digest, Sha256};

/// A strong ETag (RFC 7232 §2.3) over the snapshot's canonical-JSON
/// encoding — same content in, same quoted hex digest out, so a GM console
/// holding a stale copy can `If-None-Match` and get a cheap 304 instead of
/// re-downloading an unchanged `sync:full`.
#[must_use]
pub fn etag(snapshot: &StateSnapshot) -> String {
	let encoded = serde_json::to_vec(snapshot).unwrap_or_default();
	let digest = Sha256::digest(&encoded);
	format!("\"{digest:x}\"")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::snapshot::{OrchestratorStatus, SystemStatus, VlcStatus};
	use aln_broadcast::{VideoStatus, VideoStatusKind};

	fn snapshot() -> StateSnapshot {
		StateSnapshot {
			session: None,
			scores: vec![],
			recent_transactions: vec![],
			video_status: VideoStatus { status: VideoStatusKind::Idle, queue_length: 0, token_id: None, duration: None, progress: None },
			devices: vec![],
			system_status: SystemStatus { orchestrator: OrchestratorStatus::Online, vlc: VlcStatus::Disconnected, offline: false },
		}
	}

	#[test]
	fn identical_snapshots_produce_identical_etags() {
		assert_eq!(etag(&snapshot()), etag(&snapshot()));
	}

	#[test]
	fn etag_is_quoted_hex() {
		let tag = etag(&snapshot());
		assert!(tag.starts_with('"') && tag.ends_with('"'));
		assert_eq!(tag.len(), 2 + 64);
	}

	#[test]
	fn differing_snapshots_produce_differing_etags() {
		let mut other = snapshot();
		other.system_status.offline = true;
		assert_ne!(etag(&snapshot()), etag(&other));
	}
}
