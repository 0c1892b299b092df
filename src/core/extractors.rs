//! Request extraction helpers
//!
//! Bodies are taken as raw bytes by the handlers and parsed only once the
//! authorization hook has passed, so an unauthorized caller gets a 403 even
//! when the body is malformed.

use crate::core::auth::AuthContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::store::Document;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::Value;
use std::convert::Infallible;

/// Parse a request body that must be a JSON object
///
/// An empty body is an empty object.
pub fn parse_json_object(bytes: &[u8]) -> ApiResult<Document> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) | Err(_) => Err(ApiError::invalid_body()),
    }
}

/// Pull the identity context installed by the identity middleware
///
/// Requests that bypassed the middleware get an anonymous context.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_else(|| AuthContext::from_headers(&parts.headers)))
    }
}
