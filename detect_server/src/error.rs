//! Error kinds of the detection service and their HTTP translation.
//!
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::http::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Could not open webcam: {0}")]
    DeviceUnavailable(String),

    #[error("Could not capture image: {0}")]
    CaptureFailed(String),

    #[error("YOLO model not loaded")]
    ModelUnavailable,

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Could not encode image: {0}")]
    EncodingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        // Every failure of the detection pipeline is terminal for the request.
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        log::error!("Request failed with {status}: {self}");

        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
