use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, warn};

use crate::api::validation::ErrorResponse;

/// Application-level errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired credential
    #[error("{0}")]
    Auth(String),

    /// Role or ownership mismatch
    #[error("{0}")]
    Forbidden(String),

    /// Unknown entity id
    #[error("{0}")]
    NotFound(String),

    /// A finished export whose artifact is gone from disk
    #[error("{0}")]
    MissingFile(String),

    /// Illegal state transition or uniqueness violation
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Short label rendered in the `error` field of the response body.
    pub fn label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation failed",
            AppError::Auth(_) => "Authentication required",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not found",
            AppError::MissingFile(_) => "File not found",
            AppError::Conflict(_) => "Conflict",
            AppError::Database(_) | AppError::Internal(_) => "Failed to process request",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::MissingFile(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Database(e) => {
                error!("Database error: {}", e);
                "Database error occurred".to_string()
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                "Internal error occurred".to_string()
            }
            AppError::MissingFile(msg) => {
                error!("Export artifact missing: {}", msg);
                msg.clone()
            }
            other => {
                warn!("{}: {}", other.label(), other);
                other.to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.label().to_string(),
            fields: serde_json::json!({ "message": message }),
        })
    }
}
