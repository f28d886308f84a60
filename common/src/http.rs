//! HTTP plumbing shared by both services.
//!
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{http::StatusCode, Json, Router};
use serde::{Deserialize, Serialize};

/// JSON body returned for every failed request.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Fallback for paths without a route.
pub async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not Found")))
}

/// Fallback for routes called with a method they do not serve.
pub async fn method_not_allowed() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody::new("Method Not Allowed")),
    )
}

/// Serve `app` on `addr` until Ctrl-C is received.
pub async fn serve(app: Router, addr: SocketAddr) -> Result<()> {
    log::info!("Listening on http://{addr}");

    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown requested"),
        Err(err) => log::error!("Could not listen for shutdown signal: {err}"),
    }
}
