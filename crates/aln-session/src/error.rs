use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

/// §7 taxonomy: validation (illegal transitions, missing session) and
/// not-found entries this service can raise directly. Transaction
/// adjudication errors pass through from [`aln_transactions::TransactionError`]
/// unchanged.
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("no current session")]
	NoCurrentSession,
	#[error("team already exists: {0}")]
	TeamAlreadyExists(String),
	#[error("illegal session status transition: {from:?} -> {to:?}")]
	IllegalTransition { from: aln_types::session::SessionStatus, to: aln_types::session::SessionStatus },
	#[error(transparent)]
	Transaction(#[from] aln_transactions::TransactionError),
	#[error(transparent)]
	Persistence(#[from] aln_persistence::PersistenceError),
	#[error(transparent)]
	OfflineQueue(#[from] aln_offline_queue::OfflineQueueError),
}
