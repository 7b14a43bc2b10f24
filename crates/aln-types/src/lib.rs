//! Shared value types for the ALN orchestrator.
//!
//! Every payload that crosses a service boundary in this workspace is an explicit,
//! serde-tagged type defined here. No service reaches for `serde_json::Value` once
//! a concrete shape is known, and nothing round-trips through duck typing.

pub mod cue;
pub mod device;
pub mod event;
pub mod offline_queue;
pub mod session;
pub mod team_score;
pub mod token;
pub mod transaction;

pub use cue::{ActiveCompoundCue, CompoundCueState, ConditionOp, CueBody, CueCommand, CueCondition, CueDefinition, CueTrigger, RoutingTable, TimelineEntry};
pub use device::{ConsoleKind, DeviceSummary};
pub use event::{DomainEvent, EventEnvelope};
pub use offline_queue::OfflineQueueItem;
pub use session::{Session, SessionMetadata, SessionStatus};
pub use team_score::{AdminAdjustment, TeamScore};
pub use token::{MediaAssets, Token};
pub use transaction::{DeviceType, ScanRequest, Transaction, TransactionMode, TransactionStatus};

/// Opaque session identifier. Newtype instead of a bare `String` so a caller can't
/// accidentally pass a `teamId` where a `sessionId` is expected.
pub type SessionId = String;
pub type TeamId = String;
pub type DeviceId = String;
pub type TokenId = String;
pub type GroupId = String;
pub type CueId = String;
