//! Error types for usertree-api
//!
//! Every failure leaves as `{"error": {"code", "message", "details"?}}`.
//! Server-side causes are logged here and replaced by a generic message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;

/// Field name -> messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request failed input validation (422)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: FieldErrors,
    },

    /// Upload extension is not csv/txt/tsv/json (400)
    #[error("Unsupported file type")]
    UnsupportedFormat,

    /// Upload parsed to zero records (422)
    #[error("No valid data found in the file")]
    NoDataFound,

    /// Upload could not be decoded (422)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Upload row has the wrong shape (422)
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// Upload exceeded the configured body limit (413)
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown username or wrong password (401)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Import transaction rolled back (500); cause is logged only
    #[error("Import failed: {0}")]
    ImportFailed(String),

    /// Registration hit an unexpected failure (500); cause is logged only
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut details = FieldErrors::new();
        details.insert(field.to_string(), vec![message.into()]);
        Self::validation(details)
    }

    /// Validation failure from collected field messages
    pub fn validation(details: FieldErrors) -> Self {
        let message = details
            .values()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| "The given data was invalid.".to_string());
        Self::Validation { message, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut details = None;

        let (status, error_code, message) = match self {
            ApiError::Validation {
                message,
                details: fields,
            } => {
                details = Some(fields);
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
            }
            ApiError::UnsupportedFormat => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_FORMAT",
                "Unsupported file type".to_string(),
            ),
            ApiError::NoDataFound => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_DATA_FOUND",
                "No valid data found in the file".to_string(),
            ),
            ApiError::Parse(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_ERROR", msg),
            ApiError::MalformedRow { line, reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "MALFORMED_ROW",
                format!("Malformed row at line {}: {}", line, reason),
            ),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            ApiError::ImportFailed(cause) => {
                error!("Import failed: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IMPORT_FAILED",
                    "Internal Server Error. Check logs.".to_string(),
                )
            }
            ApiError::RegistrationFailed(cause) => {
                error!("Registration failed: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REGISTRATION_FAILED",
                    "Registration failed".to_string(),
                )
            }
            ApiError::Internal(cause) => {
                error!("Internal error: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = json!(details);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<usertree_common::Error> for ApiError {
    fn from(err: usertree_common::Error) -> Self {
        use usertree_common::Error;

        match err {
            Error::UnsupportedFormat(_) => ApiError::UnsupportedFormat,
            Error::NoDataFound => ApiError::NoDataFound,
            Error::Parse(msg) => ApiError::Parse(msg),
            Error::MalformedRow { line, reason } => ApiError::MalformedRow { line, reason },
            Error::ImportFailed(cause) => ApiError::ImportFailed(cause),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Flatten validator output into field -> messages
pub fn field_errors(err: &validator::ValidationErrors) -> FieldErrors {
    let mut details = FieldErrors::new();
    for (field, errors) in err.field_errors() {
        let messages = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("The {} field is invalid.", field))
            })
            .collect();
        details.insert(field.to_string(), messages);
    }
    details
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::validation(field_errors(&err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::field("body", rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
