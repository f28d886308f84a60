//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use common::http::{method_not_allowed, not_found};
use serde_json::{json, Value};

use crate::{
    error::LedError,
    led::{LedController, LedStatus},
};

/// Build the router of the LED service.
pub fn router(led: Arc<LedController>) -> Router {
    Router::new()
        .route("/", get(root).fallback(method_not_allowed))
        .route("/led/toggle", post(toggle).fallback(method_not_allowed))
        .route("/led/status", get(status).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(Extension(led))
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Raspberry Pi LED Controller API" }))
}

/// Toggle the LED on/off.
pub async fn toggle(
    Extension(led): Extension<Arc<LedController>>,
) -> Result<Json<Value>, LedError> {
    let new_state = tokio::task::spawn_blocking(move || led.toggle())
        .await
        .map_err(|err| LedError::Internal(err.to_string()))??;

    Ok(Json(json!({
        "status": "success",
        "led_state": new_state,
    })))
}

/// Current LED state.
pub async fn status(
    Extension(led): Extension<Arc<LedController>>,
) -> Result<Json<LedStatus>, LedError> {
    // File access blocks, keep it off the async workers.
    let status = tokio::task::spawn_blocking(move || led.status())
        .await
        .map_err(|err| LedError::Internal(err.to_string()))??;

    Ok(Json(status))
}
