use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::state::ProcessingSwitch;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    processing_enabled: bool,
}

async fn home() -> &'static str {
    "🤖 Bot is running!"
}

async fn healthz(State(processing): State<ProcessingSwitch>) -> Json<Health> {
    Json(Health {
        status: "ok",
        processing_enabled: processing.is_enabled(),
    })
}

pub fn router(processing: ProcessingSwitch) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .with_state(processing)
}

/// Serves the liveness endpoint polled by hosting platforms until the process exits.
pub async fn serve(port: u16, processing: ProcessingSwitch) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Keep-alive endpoint listening on {addr}");
    axum::serve(listener, router(processing)).await?;
    Ok(())
}
