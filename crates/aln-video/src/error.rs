use thiserror::Error;

pub type Result<T> = std::result::Result<T, VideoError>;

/// §7 taxonomy entries this service can raise: `conflict` (unconditional
/// play while something is already playing) and `validation` (pause/resume
/// called in the wrong state).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VideoError {
	#[error("a video is already playing")]
	AlreadyPlaying,
	#[error("no video is currently playing")]
	NothingPlaying,
	#[error("current video is not paused")]
	NotPaused,
}
