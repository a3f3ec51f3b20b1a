use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, field, message) = match self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, None, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, None, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, None, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, None, msg),
            AppError::Validation { field, message } => (StatusCode::BAD_REQUEST, field, message),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, None, msg),
            AppError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, None, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        // No stack traces or internal identifiers leak to the client.
        let body = match field {
            Some(field) => Json(json!({ "error": message, "field": field })),
            None => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}
