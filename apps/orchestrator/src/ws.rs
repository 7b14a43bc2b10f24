use crate::state::AppState;
use aln_broadcast::{ConsoleSink, SendError};
use aln_types::{DeviceId, EventEnvelope, ScanRequest, SessionStatus, TeamId};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub fn router(state: AppState) -> Router {
	Router::new().route("/ws", get(upgrade)).with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
	device_id: DeviceId,
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<WsQuery>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_socket(socket, state, query.device_id))
}

/// Bridges one console's socket to the [`aln_broadcast::ConsoleRegistry`]:
/// an outbound `mpsc` channel plays the `ConsoleSink` role for fan-out, and
/// a read loop decodes inbound console frames into the same service calls
/// the HTTP surface uses.
struct ChannelSink {
	tx: mpsc::UnboundedSender<Message>,
}

impl ConsoleSink for ChannelSink {
	fn send(&self, envelope: &EventEnvelope) -> Result<(), SendError> {
		let text = serde_json::to_string(envelope).map_err(|_| SendError)?;
		self.tx.send(Message::Text(text)).map_err(|_| SendError)
	}
}

/// Client→server frames (§6 persistent console protocol): the same
/// `{event, data}` shape the broadcast layer uses for its own outbound
/// envelopes (§4.10), just without the timestamp a reply doesn't need.
#[derive(Deserialize)]
struct InboundEnvelope {
	event: String,
	#[serde(default)]
	data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmCommand {
	action: String,
	#[serde(default)]
	payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionPayload {
	name: String,
	teams: Vec<TeamId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSessionPayload {
	status: SessionStatus,
}

async fn handle_socket(socket: WebSocket, state: AppState, device_id: DeviceId) {
	let (mut sender, mut receiver) = socket.split();
	let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

	state.devices.connect_gm(device_id.clone());
	state.broadcast.registry().register(device_id.clone(), Arc::new(ChannelSink { tx }));
	// Handshake success sends `sync:full` immediately (§6 persistent console protocol).
	state.aggregator.broadcast_sync_full().await;

	let outbound = tokio::spawn(async move {
		while let Some(message) = rx.recv().await {
			if sender.send(message).await.is_err() {
				break;
			}
		}
	});

	while let Some(Ok(message)) = receiver.next().await {
		let Message::Text(text) = message else { continue };
		let Ok(inbound) = serde_json::from_str::<InboundEnvelope>(&text) else {
			tracing::warn!(%device_id, "ignoring unparseable console message");
			continue;
		};

		match inbound.event.as_str() {
			"transaction:submit" => match serde_json::from_value::<ScanRequest>(inbound.data) {
				Ok(request) => {
					let submitting_device = request.device_id.clone();
					let video_playing = state.video.is_playing();
					let wait_time = state.video.get_remaining_time();
					match state.session.process_scan(request, video_playing, wait_time).await {
						Ok(response) => state.broadcast.send_transaction_result(&submitting_device, &response),
						Err(error) => tracing::warn!(%device_id, %error, "scan submission failed"),
					}
				}
				Err(error) => tracing::warn!(%device_id, %error, "malformed transaction:submit payload"),
			},
			"sync:request" => {
				state.aggregator.broadcast_sync_full().await;
			}
			"batch:ack" => {
				tracing::debug!(%device_id, "received batch:ack from console");
			}
			"gm:command" => {
				let Ok(command) = serde_json::from_value::<GmCommand>(inbound.data) else {
					tracing::warn!(%device_id, "malformed gm:command payload");
					continue;
				};
				handle_gm_command(&state, &device_id, &command).await;
			}
			other => tracing::warn!(%device_id, event = other, "unrecognized console event"),
		}
	}

	state.broadcast.registry().unregister(&device_id);
	state.devices.disconnect(&device_id, "socket closed");
	outbound.abort();
}

/// Dispatches `gm:command` admin operations (§6) to the same service calls
/// the HTTP surface uses; each arm logs and drops its own failure rather
/// than tearing down the socket, matching how a malformed HTTP body would
/// only fail its own request.
async fn handle_gm_command(state: &AppState, device_id: &DeviceId, command: &GmCommand) {
	let result = match command.action.as_str() {
		"create_session" => match serde_json::from_value::<CreateSessionPayload>(command.payload.clone()) {
			Ok(payload) => state.session.create_session(payload.name, &payload.teams).await.map(|_| ()).map_err(Into::into),
			Err(error) => Err(anyhow::anyhow!(error)),
		},
		"update_session" => match serde_json::from_value::<UpdateSessionPayload>(command.payload.clone()) {
			Ok(payload) => state.session.update_session_status(payload.status).await.map(|_| ()).map_err(Into::into),
			Err(error) => Err(anyhow::anyhow!(error)),
		},
		"reset" => {
			if state.session.current_session().await.is_some() {
				if let Err(error) = state.session.end_session().await {
					tracing::warn!(%device_id, %error, "gm:command reset failed to end session");
				}
			}
			state.video.clear_queue();
			state.cue_engine.reset().await;
			Ok(())
		}
		"video:control" => match command.payload.get("action").and_then(Value::as_str) {
			Some("play") => match command.payload.get("tokenId").and_then(Value::as_str) {
				Some(token_id) => match state.catalog.get(token_id) {
					Some(token) => state.video.play_now(token, "gm:command".into()).map_err(Into::into),
					None => Err(anyhow::anyhow!("unknown token id: {token_id}")),
				},
				None => Err(anyhow::anyhow!("tokenId is required for the play action")),
			},
			Some("pause") => state.video.pause_current().map_err(Into::into),
			Some("resume") => state.video.resume_current().map_err(Into::into),
			Some("skip") => {
				state.video.skip_current();
				Ok(())
			}
			Some("stop") => {
				state.video.stop_current();
				Ok(())
			}
			_ => Err(anyhow::anyhow!("unrecognized video:control action")),
		},
		other => Err(anyhow::anyhow!("unrecognized gm:command action: {other}")),
	};
	if let Err(error) = result {
		tracing::warn!(%device_id, %error, action = %command.action, "gm:command failed");
	}
}
