use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::board::BoardError;

const LOG_TARGET: &str = "server::error";

/// HTTP-facing error type. The core distinguishes four `BoardError` kinds;
/// the external HTTP layer maps every one of them to the same conflict
/// status with the error's message text.
#[derive(Debug)]
pub enum ApiError {
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Internal(message) => {
                error!(target = LOG_TARGET, %message, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}
