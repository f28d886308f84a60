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
    error::DetectError,
    pipeline::{HealthStatus, Pipeline},
    response::DetectionResponse,
};

/// Build the router of the detection service.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(root).fallback(method_not_allowed))
        .route("/detect", post(detect).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(Extension(pipeline))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Raspberry Pi Object Detection API",
        "endpoint": "/detect",
    }))
}

/// Capture an image from the camera, detect objects and return the annotated result.
pub async fn detect(
    Extension(pipeline): Extension<Arc<Pipeline>>,
) -> Result<Json<DetectionResponse>, DetectError> {
    log::info!("Detection requested");

    // Camera and network block, keep them off the async workers.
    let response = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .map_err(|err| DetectError::Internal(err.to_string()))??;

    Ok(Json(response))
}

/// Check camera and model independently. Always answers with 200.
pub async fn health(Extension(pipeline): Extension<Arc<Pipeline>>) -> Json<HealthStatus> {
    let model = pipeline.model_ok().into();

    let camera = match tokio::task::spawn_blocking(move || pipeline.camera_ok()).await {
        Ok(ok) => ok,
        Err(err) => {
            log::error!("Camera check failed unexpectedly: {err}");
            false
        }
    };

    Json(HealthStatus {
        camera: camera.into(),
        model,
    })
}
