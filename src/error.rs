//! Service and HTTP error types.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in room and gateway operations.
///
/// All variants are recoverable and local to the offending command: they are
/// reported back to the originating connection and never affect other
/// players or rooms.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced PIN has no live room.
    #[error("room not found: {0}")]
    RoomNotFound(String),
    /// A non-host connection attempted a host-only operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The operation is not valid in the room's current phase.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A start was attempted below the configured player minimum.
    #[error("not enough players to start: {current} joined, {required} required")]
    NotEnoughPlayers {
        /// Players currently in the room.
        current: usize,
        /// Configured minimum.
        required: usize,
    },
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RoomNotFound(pin) => AppError::NotFound(format!("room `{pin}`")),
            ServiceError::Unauthorized(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::BadRequest(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            err @ ServiceError::NotEnoughPlayers { .. } => AppError::BadRequest(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
