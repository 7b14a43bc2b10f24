//! Transaction adjudication (§4.6): the component where scan requests become
//! scoring decisions — validation, duplicate policy, group-completion
//! bonuses, admin adjustments, and deterministic score rebuilds.

pub mod error;
pub mod response;
pub mod service;

pub use error::{Result, TransactionError};
pub use response::ScanResponse;
pub use service::{TransactionService, DEFAULT_RECENT_LIMIT};
