// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal server error")]
    Internal,

    #[error("validation error: {0}")]
    BadRequest(String),

    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("database error: {:?}", e);

                // Unique-index violations surface as a conflict, everything
                // else from the store is a server-side failure.
                if e.to_string().contains("E11000") {
                    (StatusCode::CONFLICT, "record already exists".to_string())
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database operation failed".to_string(),
                    )
                }
            }
            AppError::Bson(ref e) => {
                tracing::error!("bson serialization error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database operation failed".to_string(),
                )
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
            AppError::ValidationError(ref e) => {
                (StatusCode::BAD_REQUEST, format!("invalid input: {}", e))
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
