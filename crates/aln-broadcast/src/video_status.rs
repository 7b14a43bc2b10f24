use aln_video::{PlaybackStatus, VideoQueueService};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatusKind {
	Idle,
	Loading,
	Playing,
	Paused,
}

/// The one shape every `video:*` domain event collapses into on the wire
/// (§4.10) — clients never see `video:loading`/`video:started`/etc.
/// individually, only the current synthesized `video:status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
	pub status: VideoStatusKind,
	pub queue_length: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub progress: Option<f64>,
}

impl VideoStatus {
	#[must_use]
	pub fn snapshot(video: &VideoQueueService) -> Self {
		let queue_length = video.get_queue_items().len();
		match video.get_current_video() {
			None => Self { status: VideoStatusKind::Idle, queue_length, token_id: None, duration: None, progress: None },
			Some(current) => Self {
				status: match current.status {
					PlaybackStatus::Loading => VideoStatusKind::Loading,
					PlaybackStatus::Playing => VideoStatusKind::Playing,
					PlaybackStatus::Paused => VideoStatusKind::Paused,
				},
				queue_length,
				token_id: Some(current.token_id),
				duration: Some(current.duration_secs),
				progress: Some(current.position),
			},
		}
	}
}
