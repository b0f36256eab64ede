use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wallwars_core::{ConfigError, IllegalAction, ReplayError};

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Illegal(#[from] IllegalAction),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Illegal(e) => (StatusCode::CONFLICT, e.to_string()),
            AppError::InvalidConfig(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unexpected error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "detail": message }))).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Illegal(e) => AppError::Illegal(e),
            SessionError::UnknownToken | SessionError::Spectator => AppError::Forbidden(e.to_string()),
            SessionError::NotAllowed(msg) => AppError::Conflict(msg),
            SessionError::MatchFull | SessionError::Negotiation(_) => AppError::Conflict(e.to_string()),
            SessionError::Replay(ReplayError::Illegal(e)) => AppError::Illegal(e),
            SessionError::Replay(e) => AppError::Internal(e.to_string()),
        }
    }
}
