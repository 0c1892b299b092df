//! ServerBuilder for fluent API to build HTTP servers

use super::host::ServerHost;
use super::registry::ResourceRegistry;
use super::router::build_router;
use crate::config::AppConfig;
use crate::core::auth::{Argon2Hasher, PasswordHashing};
use crate::core::context::{DEFAULT_TOKENS_LIMIT, Services};
use crate::core::resource::Resource;
use crate::core::store::DocumentStore;
use crate::core::validation::{RuleSet, Validator};
use crate::resources::{Story, User};
use crate::storage::{InMemoryStore, JsonFileStore};
use anyhow::{Result, anyhow, bail};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers with auto-registered routes
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryStore::new())
///     .register_default_resources()
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    hasher: Option<Arc<dyn PasswordHashing>>,
    rules: Option<RuleSet>,
    registry: ResourceRegistry,
    prefix: String,
    tokens_limit: usize,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with the `/api` prefix
    pub fn new() -> Self {
        Self {
            store: None,
            hasher: None,
            rules: None,
            registry: ResourceRegistry::new(),
            prefix: "/api".to_string(),
            tokens_limit: DEFAULT_TOKENS_LIMIT,
        }
    }

    /// Builder configured from an [`AppConfig`]
    ///
    /// Picks the JSON-file store when a data folder is configured, the
    /// in-memory store otherwise. Resources are not registered.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let hasher = Argon2Hasher::with_costs(
            config.auth.hash_memory_kib,
            config.auth.hash_iterations,
            config.auth.hash_parallelism,
        )?;

        let builder = Self::new()
            .with_prefix(&config.api.prefix)
            .with_tokens_limit(config.auth.tokens_limit)
            .with_hasher(hasher);

        Ok(match &config.storage.data_folder {
            Some(folder) => {
                tracing::info!(folder = %folder.display(), "using JSON file storage");
                builder.with_store(JsonFileStore::open(folder).await?)
            }
            None => {
                tracing::info!("using in-memory storage");
                builder.with_store(InMemoryStore::new())
            }
        })
    }

    /// Set the document store (required)
    pub fn with_store(mut self, store: impl DocumentStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a document store that is also used elsewhere
    pub fn with_shared_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the password hasher (Argon2 with default costs otherwise)
    pub fn with_hasher(mut self, hasher: impl PasswordHashing + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    /// Set the validation rule set (built-in rules otherwise)
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Bound on the token history of one identity
    pub fn with_tokens_limit(mut self, limit: usize) -> Self {
        self.tokens_limit = limit;
        self
    }

    /// Register a resource type
    pub fn register_resource<R: Resource>(mut self) -> Self {
        self.registry.register_resource::<R>();
        self
    }

    /// Register the users and stories resources
    pub fn register_default_resources(self) -> Self {
        self.register_resource::<User>().register_resource::<Story>()
    }

    /// Build the host holding all shared state
    pub fn build_host(self) -> Result<ServerHost> {
        let store = self
            .store
            .ok_or_else(|| anyhow!("DocumentStore is required. Call .with_store()"))?;

        if self.tokens_limit == 0 {
            bail!("tokens limit must be at least 1");
        }
        self.registry.validate()?;

        let hasher = self
            .hasher
            .unwrap_or_else(|| Arc::new(Argon2Hasher::default()));
        let rules = self.rules.unwrap_or_else(RuleSet::builtin);
        let validator = Validator::new(rules, store.clone());
        let services = Services::new(store, hasher, validator, self.tokens_limit);

        Ok(ServerHost::new(services, self.registry, &self.prefix))
    }

    /// Build the final router
    pub fn build(self) -> Result<Router> {
        let host = Arc::new(self.build_host()?);
        Ok(build_router(host))
    }

    /// Serve the application with graceful shutdown
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .with_store(InMemoryStore::new())
    ///     .register_default_resources()
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let host = Arc::new(self.build_host()?);
        serve_host(host, addr).await
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve an already built host
///
/// Handles SIGTERM and SIGINT (Ctrl+C) for graceful shutdown.
pub async fn serve_host(host: Arc<ServerHost>, addr: &str) -> Result<()> {
    let app = build_router(host);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Argon2Hasher {
        Argon2Hasher::with_costs(8, 1, 1).unwrap()
    }

    #[test]
    fn test_build_host_requires_store() {
        let result = ServerBuilder::new().register_default_resources().build_host();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("DocumentStore is required"));
    }

    #[test]
    fn test_build_host_rejects_zero_tokens_limit() {
        let result = ServerBuilder::new()
            .with_store(InMemoryStore::new())
            .with_tokens_limit(0)
            .build_host();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_host_defaults() {
        let host = ServerBuilder::new()
            .with_store(InMemoryStore::new())
            .with_hasher(cheap_hasher())
            .register_default_resources()
            .build_host()
            .unwrap();

        assert_eq!(host.prefix, "/api");
        assert_eq!(host.auth_route(), "/api/auth");
        assert_eq!(host.services.tokens_limit, DEFAULT_TOKENS_LIMIT);
        assert_eq!(host.collections(), vec!["users", "stories"]);
    }

    #[test]
    fn test_build_host_custom_prefix() {
        let host = ServerBuilder::new()
            .with_store(InMemoryStore::new())
            .with_prefix("/v2/")
            .with_tokens_limit(3)
            .build_host()
            .unwrap();
        assert_eq!(host.prefix, "/v2");
        assert_eq!(host.services.tokens_limit, 3);
    }

    #[tokio::test]
    async fn test_from_config_in_memory() {
        let mut config = AppConfig::default();
        config.auth.hash_memory_kib = 8;
        config.auth.hash_iterations = 1;
        config.auth.hash_parallelism = 1;
        config.auth.tokens_limit = 4;
        config.api.prefix = "/v1".to_string();

        let host = ServerBuilder::from_config(&config)
            .await
            .unwrap()
            .register_default_resources()
            .build_host()
            .unwrap();
        assert_eq!(host.prefix, "/v1");
        assert_eq!(host.services.tokens_limit, 4);
    }

    #[tokio::test]
    async fn test_from_config_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_folder = Some(dir.path().join("data"));

        let builder = ServerBuilder::from_config(&config).await.unwrap();
        assert!(builder.store.is_some());
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_custom_rules_and_shared_store() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let rules = RuleSet::builder()
            .with_rule("required", crate::core::validation::rules::Required)
            .build();

        let host = ServerBuilder::new()
            .with_shared_store(store.clone())
            .with_rules(rules)
            .build_host()
            .unwrap();

        assert!(Arc::ptr_eq(&host.services.store, &store));
        assert!(host.services.validator.rules().contains("required"));
        assert!(!host.services.validator.rules().contains("email"));
    }

    #[test]
    fn test_build_router() {
        let router = ServerBuilder::new()
            .with_store(InMemoryStore::new())
            .register_default_resources()
            .build();
        assert!(router.is_ok());
    }
}
