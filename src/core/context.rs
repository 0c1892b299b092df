//! Shared collaborators and per-request context handed to resources

use crate::core::auth::{AuthContext, KeyedLock, PasswordHashing};
use crate::core::error::ApiResult;
use crate::core::store::DocumentStore;
use crate::core::validation::Validator;
use crate::resources::User;
use std::collections::HashMap;
use std::sync::Arc;

/// Default bound on the token history of one identity
pub const DEFAULT_TOKENS_LIMIT: usize = 10;

/// Collaborators shared by every request
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub hasher: Arc<dyn PasswordHashing>,
    pub validator: Validator,
    pub tokens_limit: usize,
    pub token_locks: Arc<KeyedLock>,
}

impl Services {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        hasher: Arc<dyn PasswordHashing>,
        validator: Validator,
        tokens_limit: usize,
    ) -> Self {
        Self {
            store,
            hasher,
            validator,
            tokens_limit,
            token_locks: Arc::new(KeyedLock::new()),
        }
    }
}

/// Everything a resource hook may inspect about the current request
#[derive(Clone)]
pub struct RequestContext {
    pub services: Services,
    pub auth: AuthContext,
    id: Option<String>,
    query: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(services: Services, auth: AuthContext) -> Self {
        Self {
            services,
            auth,
            id: None,
            query: HashMap::new(),
        }
    }

    /// Attach the `{id}` path parameter
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach the query string parameters
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Path parameter of item routes
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Query string parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Acting identity, resolved lazily and cached for the request
    pub async fn identity(&self) -> ApiResult<Option<&User>> {
        self.auth.identity(&self.services).await
    }

    /// Whether the acting identity is an administrator
    pub async fn is_admin(&self) -> ApiResult<bool> {
        Ok(self.identity().await?.is_some_and(|u| u.admin))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.services.store.as_ref()
    }
}
