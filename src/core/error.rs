//! Typed error handling for the request pipeline
//!
//! Every failure raised while serving a request ends up as an [`ApiError`].
//! Handlers return `Result<_, ApiError>` and the [`IntoResponse`] impl below is
//! the single place where failures are turned into HTTP responses.
//!
//! # Error Categories
//!
//! - `AuthenticationFailed`: wrong credentials on the auth route (400)
//! - `InvalidBody`: request body is not a JSON object (400)
//! - `Unauthenticated`: no identity could be resolved (401)
//! - `PermissionDenied`: an authorization hook refused the operation (403)
//! - `NotFound`: item lookup by id missed (404)
//! - `Validation`: the validation engine reported violations (422)
//! - `Internal`: anything else (500, details stay in the logs)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Result alias used across resources and handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// The main error type of the request pipeline
#[derive(Debug)]
pub enum ApiError {
    /// Bad credentials or malformed authentication request
    AuthenticationFailed { message: String },

    /// Request body could not be parsed as a JSON object
    InvalidBody { message: String },

    /// No identity resolved for a protected route
    Unauthenticated,

    /// Authorization hook denied the operation
    PermissionDenied(Denial),

    /// Item lookup by id missed
    NotFound,

    /// One or more validation rules failed
    Validation(Vec<FieldViolation>),

    /// Unexpected failure
    Internal(anyhow::Error),
}

/// Body of a permission denial
#[derive(Debug, Clone, PartialEq)]
pub enum Denial {
    /// Plain text message
    Message(String),

    /// Resource-specific diagnostic object, forwarded verbatim
    Payload(Value),
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Field that failed validation
    pub field: String,
    /// Rule that was violated (e.g. "required", "email")
    pub validation: String,
    /// Human-readable message
    pub message: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        validation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            validation: validation.into(),
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Wrong credentials on the authentication route
    pub fn wrong_credentials() -> Self {
        ApiError::AuthenticationFailed {
            message: "wrong credentials".to_string(),
        }
    }

    /// Request body parse failure
    pub fn invalid_body() -> Self {
        ApiError::InvalidBody {
            message: "Couldn't parse request body".to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationFailed { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::AuthenticationFailed { message } => write!(f, "{}", message),
            ApiError::InvalidBody { message } => write!(f, "{}", message),
            ApiError::Unauthenticated => write!(f, "Authorization Required"),
            ApiError::PermissionDenied(Denial::Message(message)) => write!(f, "{}", message),
            ApiError::PermissionDenied(Denial::Payload(payload)) => {
                match payload.get("message").and_then(Value::as_str) {
                    Some(message) => write!(f, "{}", message),
                    None => write!(f, "Permission denied"),
                }
            }
            ApiError::NotFound => write!(f, "Not Found"),
            ApiError::Validation(violations) => {
                let msgs: Vec<String> = violations
                    .iter()
                    .map(|v| format!("{}: {}", v.field, v.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ApiError::Internal(err) => write!(f, "Internal error: {}", err),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Internal(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Validation(violations) => {
                (status, Json(json!({ "errors": violations }))).into_response()
            }
            ApiError::PermissionDenied(Denial::Payload(payload)) => {
                (status, Json(payload)).into_response()
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                (status, "Internal Server Error").into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}
