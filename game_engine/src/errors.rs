use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Codes attached to 400 responses so clients can react without parsing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidTypes,
    SamePlayer,
    EmptyDeck,
    WrongStatus,
    NotParticipant,
    WrongDeckSize,
    DuplicateCards,
    CardNotInDeck,
    AlreadyMovedThisRound,
    CardAlreadyPlayed,
    NoDeck,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("{msg}")]
    Validation {
        code: Option<ValidationCode>,
        msg: String,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    Upstream(String),
    #[error("internal error: {0:?}")]
    Internal(#[from] anyhow::Error),
}

impl GameError {
    pub fn validation(code: ValidationCode, msg: impl Into<String>) -> Self {
        GameError::Validation {
            code: Some(code),
            msg: msg.into(),
        }
    }

    pub fn validation_msg(msg: impl Into<String>) -> Self {
        GameError::Validation {
            code: None,
            msg: msg.into(),
        }
    }
}

impl ResponseError for GameError {
    fn status_code(&self) -> StatusCode {
        match self {
            GameError::Validation { .. } => StatusCode::BAD_REQUEST,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Permission(_) => StatusCode::FORBIDDEN,
            GameError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let body = match self {
            GameError::Validation { code: Some(code), msg } => {
                json!({ "msg": msg, "code": code })
            }
            GameError::Validation { code: None, msg } => json!({ "msg": msg }),
            GameError::NotFound(msg) | GameError::Permission(msg) | GameError::Upstream(msg) => {
                json!({ "msg": msg })
            }
            // Internals stay opaque to clients.
            GameError::Internal(_) => json!({ "msg": "Internal server error" }),
        };

        HttpResponse::build(status).json(body)
    }
}

pub type GameResult<T> = Result<T, GameError>;
