use thiserror::Error;

pub type Result<T> = std::result::Result<T, CueEngineError>;

/// §7 taxonomy: everything else the engine encounters (cycles, re-entry,
/// depth cap, video conflict, command failure) is non-fatal and surfaces
/// as a `cue:error`/`cue:conflict` event rather than a `Result::Err` — only
/// "the caller asked for a cue id that does not exist" is a genuine error.
#[derive(Debug, Error)]
pub enum CueEngineError {
	#[error("unknown cue id: {0}")]
	UnknownCue(String),
}
