use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Maps every service-crate error this binary can observe to the §7 status
/// family, one variant per source crate rather than a single catch-all —
/// `From` impls below do the actual mapping work.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error(transparent)]
	Session(#[from] aln_session::SessionError),
	#[error(transparent)]
	Transaction(#[from] aln_transactions::TransactionError),
	#[error(transparent)]
	Video(#[from] aln_video::VideoError),
	#[error(transparent)]
	Cue(#[from] aln_cues::CueEngineError),
	#[error(transparent)]
	OfflineQueue(#[from] aln_offline_queue::OfflineQueueError),
	#[error(transparent)]
	Persistence(#[from] aln_persistence::PersistenceError),
	#[error("{0}")]
	Validation(String),
	#[error("unknown token id: {0}")]
	UnknownToken(String),
}

impl ApiError {
	fn status(&self) -> StatusCode {
		match self {
			ApiError::Session(aln_session::SessionError::NoCurrentSession) => StatusCode::NOT_FOUND,
			ApiError::Session(aln_session::SessionError::TeamAlreadyExists(_)) => StatusCode::CONFLICT,
			ApiError::Session(aln_session::SessionError::IllegalTransition { .. }) => StatusCode::CONFLICT,
			ApiError::Session(aln_session::SessionError::Transaction(inner)) => status_of_transaction(inner),
			ApiError::Session(aln_session::SessionError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
			ApiError::Session(aln_session::SessionError::OfflineQueue(inner)) => status_of_offline_queue(inner),
			ApiError::Transaction(inner) => status_of_transaction(inner),
			ApiError::Video(aln_video::VideoError::AlreadyPlaying) => StatusCode::CONFLICT,
			ApiError::Video(_) => StatusCode::BAD_REQUEST,
			ApiError::Cue(aln_cues::CueEngineError::UnknownCue(_)) => StatusCode::NOT_FOUND,
			ApiError::OfflineQueue(inner) => status_of_offline_queue(inner),
			ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
			ApiError::Validation(_) => StatusCode::BAD_REQUEST,
			ApiError::UnknownToken(_) => StatusCode::NOT_FOUND,
		}
	}
}

fn status_of_transaction(err: &aln_transactions::TransactionError) -> StatusCode {
	match err {
		aln_transactions::TransactionError::NoActiveSession => StatusCode::NOT_FOUND,
		aln_transactions::TransactionError::UnknownTeam(_) => StatusCode::NOT_FOUND,
		aln_transactions::TransactionError::UnknownTransaction(_) => StatusCode::NOT_FOUND,
	}
}

fn status_of_offline_queue(err: &aln_offline_queue::OfflineQueueError) -> StatusCode {
	match err {
		aln_offline_queue::OfflineQueueError::QueueFull(_) => StatusCode::CONFLICT,
		aln_offline_queue::OfflineQueueError::BatchConflict(_) => StatusCode::CONFLICT,
		aln_offline_queue::OfflineQueueError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		tracing::warn!(error = %self, %status, "request failed");
		(status, Json(json!({ "error": self.to_string() }))).into_response()
	}
}
