//! Router assembly
//!
//! Routes, under the host prefix:
//! - POST /auth - exchange credentials for a bearer token
//! - GET /me - profile of the acting identity
//! - CRUD routes of every registered resource
//! - anything else answers 404 through the uniform error path

use crate::server::handlers;
use crate::server::host::ServerHost;
use crate::server::middleware::{attach_identity, require_identity};
use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Build the application router from a host
pub fn build_router(host: Arc<ServerHost>) -> Router {
    let resource_routes = host.registry.build_routes(&host.prefix);

    Router::new()
        .route(&host.auth_route(), post(handlers::authenticate))
        .route(&host.me_route(), get(handlers::me))
        .merge(resource_routes)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(attach_identity))
                .layer(from_fn_with_state(host.clone(), require_identity)),
        )
        .with_state(host)
}
