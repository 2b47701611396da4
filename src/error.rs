use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    /// The link could not be established or was lost.
    Transport(String),
    /// A malformed or unexpected message.
    Protocol(String),
    /// The avatar API rejected our credential.
    Credential(String),
    /// Invalid port or address, or a bind failure.
    Configuration(String),
    /// Token persistence failed.
    Storage(std::io::Error),
    BadRequest(String),
    Internal(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport_error",
            AppError::Protocol(_) => "protocol_error",
            AppError::Credential(_) => "credential_error",
            AppError::Configuration(_) => "configuration_error",
            AppError::Storage(_) => "internal_error",
            AppError::BadRequest(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
            AppError::Credential(_) => StatusCode::UNAUTHORIZED,
            AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Storage(e) => {
                tracing::error!("token storage error: {e}");
                "token storage failed".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "internal server error".to_string()
            }
            AppError::Transport(msg)
            | AppError::Protocol(msg)
            | AppError::Credential(msg)
            | AppError::Configuration(msg)
            | AppError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Transport(msg) => write!(f, "transport error: {msg}"),
            AppError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            AppError::Credential(msg) => write!(f, "credential rejected: {msg}"),
            AppError::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            AppError::Storage(e) => write!(f, "token storage error: {e}"),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Protocol(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::error::ProtocolError;
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            // A peer that vanished mid-stream is a lost link, not a bad one.
            WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                AppError::Transport(e.to_string())
            }
            WsError::Protocol(p) => AppError::Protocol(p.to_string()),
            WsError::Url(u) => AppError::Configuration(u.to_string()),
            other => AppError::Transport(other.to_string()),
        }
    }
}
