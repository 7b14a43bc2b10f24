mod config;
mod error;
mod http;
mod state;
mod ws;

use clap::Parser;
use config::OrchestratorConfig;
use state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(true)
		.with_thread_ids(true)
		.with_line_number(true)
		.init();

	let config = OrchestratorConfig::parse();
	tracing::info!(bind_addr = %config.bind_addr, storage = ?config.storage_type, "starting orchestrator");

	let (app_state, background) = AppState::build(config).await?;
	let bind_addr = app_state.config.bind_addr.clone();

	let app = axum::Router::new().merge(http::router(app_state.clone())).merge(ws::router(app_state));

	let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
	tracing::info!(%bind_addr, "listening");

	let shutdown = async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => tracing::info!("received shutdown signal"),
			Err(error) => tracing::error!(%error, "failed to install ctrl-c handler"),
		}
		background.cancel_all();
	};

	axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

	tracing::info!("orchestrator stopped");
	Ok(())
}
