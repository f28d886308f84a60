//! Error kinds of the LED service and their HTTP translation.
//!
use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::http::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("Permission denied. Run with sudo or adjust permissions")]
    PermissionDenied,

    #[error("Not running on Raspberry Pi or LED not accessible")]
    DeviceNotSupported,

    #[error("Unexpected LED brightness {0:?}")]
    InvalidBrightness(String),

    #[error(transparent)]
    Io(io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for LedError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => LedError::PermissionDenied,
            io::ErrorKind::NotFound => LedError::DeviceNotSupported,
            _ => LedError::Io(err),
        }
    }
}

impl LedError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedError::PermissionDenied => StatusCode::FORBIDDEN,
            LedError::DeviceNotSupported
            | LedError::InvalidBrightness(_)
            | LedError::Io(_)
            | LedError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        log::error!("Request failed with {status}: {self}");

        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
