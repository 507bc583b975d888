//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes:
//! `{"error": "<code>", "message": "...", "field": "..."}`. `field` is only
//! present when a single input field is to blame.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::credentials::CredentialError;
use crate::db::DbError;
use crate::models::ValidationError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Request was well-formed but unusable (400)
    BadRequest { message: String },

    /// Missing or bad identity or credentials (401)
    Unauthorized { message: String },

    /// Identity known but not allowed (403)
    Forbidden { reason: String },

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Duplicate or state conflict (409)
    Conflict {
        field: Option<String>,
        message: String,
    },

    /// Database error (500, logged)
    Database(DbError),

    /// Internal error (500)
    Internal { message: String },
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn error_body(code: &str, message: impl Into<Value>, field: Option<&str>) -> Value {
    let message: Value = message.into();
    let mut body = json!({
        "error": code,
        "message": message,
    });
    if let Some(field) = field {
        body["field"] = Value::from(field);
    }
    body
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(e) => error_body("validation_error", e.to_string(), e.field()),
            Self::BadRequest { message } => error_body("bad_request", message.as_str(), None),
            Self::Unauthorized { message } => error_body("unauthorized", message.as_str(), None),
            Self::Forbidden { reason } => error_body("forbidden", reason.as_str(), None),
            Self::NotFound { resource, id } => error_body(
                "not_found",
                format!("{} '{}' not found", resource, id),
                None,
            ),
            Self::Conflict { field, message } => {
                error_body("conflict", message.as_str(), field.as_deref())
            }
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!("Database error: {}", e);
                error_body("internal_error", "an internal error occurred", None)
            }
            Self::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                error_body("internal_error", "an internal error occurred", None)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Conflict { field, message } => Self::Conflict { field, message },
            DbError::InvalidInput { message } => Self::BadRequest { message },
            DbError::Forbidden { reason } => Self::Forbidden { reason },
            DbError::Sqlx(_) => Self::Database(e),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}
