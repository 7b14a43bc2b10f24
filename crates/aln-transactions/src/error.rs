use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransactionError>;

/// §7 taxonomy: validation and not-found entries this service can raise.
/// Duplicate/rejected scans are deliberately *not* represented here — §7
/// states those are valid [`crate::ScanResponse`] statuses, not exceptions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
	#[error("no active session")]
	NoActiveSession,
	#[error("unknown team: {0}")]
	UnknownTeam(String),
	#[error("unknown transaction: {0}")]
	UnknownTransaction(String),
}
