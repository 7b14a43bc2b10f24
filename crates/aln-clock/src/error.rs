use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClockError>;

/// §7 `validation` taxonomy entry for illegal clock transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
	#[error("clock is not running")]
	NotRunning,
	#[error("clock is not paused")]
	NotPaused,
	#[error("clock is already running")]
	AlreadyRunning,
}
