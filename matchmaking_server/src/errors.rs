use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::token_store::StoreError;

#[derive(Debug, Error)]
pub enum MatchmakingError {
    #[error("Profile required")]
    ProfileRequired,
    #[error("Queue is full")]
    QueueFull,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token required")]
    TokenRequired,
    #[error("token store failure: {0}")]
    Store(#[from] StoreError),
}

impl ResponseError for MatchmakingError {
    fn status_code(&self) -> StatusCode {
        match self {
            MatchmakingError::ProfileRequired => StatusCode::FORBIDDEN,
            MatchmakingError::QueueFull => StatusCode::CONFLICT,
            MatchmakingError::InvalidToken => StatusCode::NOT_FOUND,
            MatchmakingError::TokenRequired => StatusCode::BAD_REQUEST,
            MatchmakingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let msg = match self {
            // Store details stay in the logs, not on the wire.
            MatchmakingError::Store(e) => {
                tracing::error!("{}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(json!({ "status": "Error", "msg": msg }))
    }
}

pub type MatchmakingResult<T> = Result<T, MatchmakingError>;
