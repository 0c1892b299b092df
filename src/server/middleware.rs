//! Identity middleware
//!
//! `attach_identity` installs a lazily resolved [`AuthContext`] on every
//! request. `require_identity` then rejects anonymous callers everywhere but
//! the authentication route. Both share the same context, so the token is
//! looked up at most once per request.

use crate::core::auth::AuthContext;
use crate::core::error::ApiError;
use crate::server::host::ServerHost;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub async fn attach_identity(mut request: Request, next: Next) -> Response {
    let auth = AuthContext::from_headers(request.headers());
    request.extensions_mut().insert(auth);
    next.run(request).await
}

pub async fn require_identity(
    State(host): State<Arc<ServerHost>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == host.auth_route() {
        return next.run(request).await;
    }

    let auth = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_else(|| AuthContext::from_headers(request.headers()));

    match auth.identity(&host.services).await {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => {
            tracing::debug!(path = %request.uri().path(), "anonymous request rejected");
            ApiError::Unauthenticated.into_response()
        }
        Err(err) => err.into_response(),
    }
}
