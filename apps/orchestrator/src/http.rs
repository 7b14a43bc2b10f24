use crate::error::ApiError;
use crate::state::AppState;
use aln_types::{ConsoleKind, DeviceId, ScanRequest, SessionStatus, TeamId};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

/// §6 HTTP surface, wired in one router rather than scattered across
/// per-module route tables.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/state", get(get_state))
		.route("/api/session", post(create_session))
		.route("/api/session/status", post(update_session_status))
		.route("/api/scan", post(submit_scan))
		.route("/api/scan/batch", post(submit_batch))
		.route("/api/transaction/:id", delete(delete_transaction))
		.route("/api/score/adjust", post(adjust_score))
		.route("/api/video/control", post(video_control))
		.route("/api/admin/reset", post(admin_reset))
		.with_state(state)
}

#[derive(Deserialize)]
struct HealthQuery {
	#[serde(rename = "deviceId")]
	device_id: Option<DeviceId>,
	#[serde(rename = "type")]
	device_type: Option<ConsoleKind>,
}

/// `GET /health?deviceId=<id>&type=player|gm` (§6): liveness probe that
/// doubles as the HTTP-heartbeat console's connection/keepalive signal when
/// `deviceId` is present — player/esp32 consoles have no persistent socket
/// to carry a handshake, so this endpoint is their only presence signal.
async fn health(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> impl IntoResponse {
	if let Some(device_id) = query.device_id {
		state.devices.heartbeat(device_id, query.device_type.unwrap_or(ConsoleKind::Player));
	}
	let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds().max(0);
	Json(json!({
		"status": "ok",
		"version": env!("CARGO_PKG_VERSION"),
		"uptime": uptime_secs,
		"timestamp": chrono::Utc::now(),
	}))
}

/// `GET /api/state`: the §4.12 `sync:full` snapshot with `If-None-Match`
/// conditional-request support, one ETag per distinct snapshot body.
async fn get_state(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
	let snapshot = state.aggregator.snapshot().await;
	let etag = aln_aggregator::etag(&snapshot);

	if headers.get(axum::http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) == Some(etag.as_str()) {
		return StatusCode::NOT_MODIFIED.into_response();
	}

	let mut response = Json(snapshot).into_response();
	response.headers_mut().insert(axum::http::header::ETAG, etag.parse().expect("hex etag is valid header value"));
	response
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
	name: String,
	teams: Vec<TeamId>,
}

async fn create_session(State(state): State<AppState>, Json(body): Json<CreateSessionRequest>) -> Result<impl IntoResponse, ApiError> {
	let session = state.session.create_session(body.name, &body.teams).await?;
	Ok(Json(session))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStatusRequest {
	status: SessionStatus,
}

async fn update_session_status(State(state): State<AppState>, Json(body): Json<UpdateStatusRequest>) -> Result<impl IntoResponse, ApiError> {
	let session = state.session.update_session_status(body.status).await?;
	Ok(Json(session))
}

/// `POST /api/scan`: adjudicates against the live session, then tells the
/// broadcast layer to unicast `transaction:result` back to the submitting
/// console — the one reply §4.10 says never travels over the event bus.
async fn submit_scan(State(state): State<AppState>, Json(request): Json<ScanRequest>) -> Result<impl IntoResponse, ApiError> {
	let device_id = request.device_id.clone();
	let video_playing = state.video.is_playing();
	let wait_time = state.video.get_remaining_time();
	let response = state.session.process_scan(request, video_playing, wait_time).await?;
	state.broadcast.send_transaction_result(&device_id, &response);
	Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
	batch_id: String,
	transactions: Vec<ScanRequest>,
}

/// `POST /api/scan/batch` (§4.8, §6): idempotent by `batchId` — a repeat
/// submission returns the cached response without re-emitting `batch:ack`
/// (§8 property 7), which is why the device to unicast the ack to is taken
/// from the batch's own transactions rather than requiring the caller to
/// name it separately.
async fn submit_batch(State(state): State<AppState>, Json(body): Json<BatchRequest>) -> Result<impl IntoResponse, ApiError> {
	let device_id = body.transactions.first().map(|t| t.device_id.clone());
	let (response, is_fresh) = state.session.submit_offline_batch(&state.offline_queue, &body.batch_id, body.transactions).await?;
	if is_fresh {
		if let Some(device_id) = device_id {
			state.broadcast.send_batch_ack(&device_id, &response);
		}
	}
	Ok(Json(response))
}

async fn delete_transaction(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
	state.session.delete_transaction(&id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustScoreRequest {
	team_id: String,
	delta: i64,
	reason: String,
	gm: String,
}

async fn adjust_score(State(state): State<AppState>, Json(body): Json<AdjustScoreRequest>) -> Result<impl IntoResponse, ApiError> {
	let updated = state.session.adjust_team_score(&body.team_id, body.delta, body.reason, body.gm).await?;
	Ok(Json(updated))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum VideoAction {
	Play,
	Pause,
	Resume,
	Skip,
	Stop,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoControlRequest {
	action: VideoAction,
	token_id: Option<String>,
}

/// `POST /api/video/control` (§6): `play` is the one admin-unconditional
/// action with its own validation chain — 400 when `tokenId` is missing,
/// 404 when it names no catalog entry, 409 when `aln_video::VideoError::
/// AlreadyPlaying` surfaces from an occupied slot.
async fn video_control(State(state): State<AppState>, Json(body): Json<VideoControlRequest>) -> Result<impl IntoResponse, ApiError> {
	match body.action {
		VideoAction::Play => {
			let token_id = body.token_id.ok_or_else(|| ApiError::Validation("tokenId is required for the play action".into()))?;
			let token = state.catalog.get(&token_id).cloned().ok_or_else(|| ApiError::UnknownToken(token_id))?;
			state.video.play_now(&token, "admin".into())?;
		}
		VideoAction::Pause => state.video.pause_current()?,
		VideoAction::Resume => state.video.resume_current()?,
		VideoAction::Skip => state.video.skip_current(),
		VideoAction::Stop => state.video.stop_current(),
	}
	Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/reset`: no single service owns "end everything" — this
/// composes the end-session, queue-clear, cue-reset, and device-disconnect
/// steps the way the composition root is the only place that holds a handle
/// to every one of them at once.
async fn admin_reset(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
	if state.session.current_session().await.is_some() {
		state.session.end_session().await?;
	}
	state.video.clear_queue();
	state.cue_engine.reset().await;
	for device in state.devices.snapshot() {
		state.devices.disconnect(&device.device_id, "admin reset");
	}
	Ok(StatusCode::NO_CONTENT)
}
