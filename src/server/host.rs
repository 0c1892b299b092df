//! Server host holding the state shared by every request
//!
//! The host is built once by the [`ServerBuilder`](super::ServerBuilder) and
//! shared behind an `Arc` as the axum router state.

use crate::core::auth::AuthContext;
use crate::core::context::{RequestContext, Services};
use crate::server::registry::ResourceRegistry;
use std::sync::Arc;

/// Host context containing all framework state
pub struct ServerHost {
    /// Collaborators handed to resources
    pub services: Services,

    /// Registered resources, keyed by collection name
    pub registry: Arc<ResourceRegistry>,

    /// Route prefix without trailing slash (e.g. `/api`)
    pub prefix: String,
}

impl ServerHost {
    pub fn new(services: Services, registry: ResourceRegistry, prefix: &str) -> Self {
        Self {
            services,
            registry: Arc::new(registry),
            prefix: normalize_prefix(prefix),
        }
    }

    /// Path of the authentication route, the only one open to anonymous callers
    pub fn auth_route(&self) -> String {
        self.path("auth")
    }

    /// Path of the profile route
    pub fn me_route(&self) -> String {
        self.path("me")
    }

    /// Join a segment onto the prefix
    pub fn path(&self, segment: &str) -> String {
        format!("{}/{}", self.prefix, segment)
    }

    /// Context for a request carrying the given identity
    pub fn context(&self, auth: AuthContext) -> RequestContext {
        RequestContext::new(self.services.clone(), auth)
    }

    /// Collection names of the registered resources
    pub fn collections(&self) -> Vec<&str> {
        self.registry.collection_names()
    }
}

/// `api`, `/api` and `/api/` all become `/api`; an empty prefix stays empty
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
