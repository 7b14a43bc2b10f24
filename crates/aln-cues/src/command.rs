//! The dispatch seam to external drivers (VLC, lighting, audio, Home
//! Assistant, Spotify, Bluetooth — §1 non-goals as *implementations*, but the
//! cue engine still needs somewhere to hand a resolved `{action, payload}`
//! pair to). The engine depends on the trait, never a concrete driver.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait CommandSink: Send + Sync {
	/// Execute one resolved timeline/simple-cue command. An `Err` is D36
	/// territory — the engine logs it as `cue:error` and keeps going, it
	/// never aborts the rest of the cue on a single command's failure.
	async fn execute(&self, action: &str, payload: Value) -> std::result::Result<(), String>;
}

/// A sink that accepts everything and does nothing, for composition roots
/// (and tests) that have not wired a real driver yet.
pub struct NoopCommandSink;

#[async_trait]
impl CommandSink for NoopCommandSink {
	async fn execute(&self, _action: &str, _payload: Value) -> std::result::Result<(), String> {
		Ok(())
	}
}
