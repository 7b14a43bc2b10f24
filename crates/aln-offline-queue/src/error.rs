use thiserror::Error;

pub type Result<T> = std::result::Result<T, OfflineQueueError>;

#[derive(Debug, Error)]
pub enum OfflineQueueError {
	#[error("queue is at capacity ({0})")]
	QueueFull(usize),
	#[error("batch {0} was already submitted with a different payload")]
	BatchConflict(String),
	#[error(transparent)]
	Persistence(#[from] aln_persistence::PersistenceError),
}
