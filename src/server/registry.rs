//! Resource registry for managing resource descriptors and generating CRUD routes

use crate::core::error::ApiResult;
use crate::core::resource::{Operation, Resource};
use crate::server::handlers;
use crate::server::host::ServerHost;
use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::Router;
use axum::routing::MethodRouter;
use indexmap::IndexMap;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Route segments taken by the framework itself
pub const RESERVED_COLLECTIONS: &[&str] = &["auth", "me"];

/// Type-erased view of a registered resource
///
/// The dispatcher only ever holds descriptors, never concrete resource types.
#[async_trait]
pub trait ResourceDescriptor: Send + Sync {
    /// Collection name (also the path segment)
    fn collection_name(&self) -> &'static str;

    /// Operations exposed over HTTP
    fn operations(&self) -> &'static [Operation];

    /// Build the routes of the exposed operations
    ///
    /// - `GET|POST {prefix}/{collection}`
    /// - `GET|PUT|DELETE {prefix}/{collection}/{id}`
    fn build_routes(&self, prefix: &str) -> Router<Arc<ServerHost>>;

    /// Safe JSON of a record, references expanded up to `depth` levels
    async fn render_by_id(&self, host: &ServerHost, id: &str, depth: usize) -> ApiResult<Option<Value>>;
}

/// Descriptor for a concrete [`Resource`] type
pub struct TypedDescriptor<R> {
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> TypedDescriptor<R> {
    pub fn new() -> Self {
        Self {
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> Default for TypedDescriptor<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> ResourceDescriptor for TypedDescriptor<R> {
    fn collection_name(&self) -> &'static str {
        R::collection_name()
    }

    fn operations(&self) -> &'static [Operation] {
        R::exposed_operations()
    }

    fn build_routes(&self, prefix: &str) -> Router<Arc<ServerHost>> {
        let ops = self.operations();
        let base = format!("{}/{}", prefix, R::collection_name());
        let mut router = Router::new();

        let mut collection: MethodRouter<Arc<ServerHost>> = MethodRouter::new();
        if ops.contains(&Operation::Index) {
            collection = collection.get(handlers::index::<R>);
        }
        if ops.contains(&Operation::Create) {
            collection = collection.post(handlers::create::<R>);
        }
        if ops.contains(&Operation::Index) || ops.contains(&Operation::Create) {
            router = router.route(&base, collection);
        }

        let mut item: MethodRouter<Arc<ServerHost>> = MethodRouter::new();
        if ops.contains(&Operation::Item) {
            item = item.get(handlers::item::<R>);
        }
        if ops.contains(&Operation::Update) {
            item = item.put(handlers::update::<R>);
        }
        if ops.contains(&Operation::Delete) {
            item = item.delete(handlers::delete::<R>);
        }
        if ops
            .iter()
            .any(|op| matches!(op, Operation::Item | Operation::Update | Operation::Delete))
        {
            router = router.route(&format!("{}/{{id}}", base), item);
        }

        router
    }

    async fn render_by_id(&self, host: &ServerHost, id: &str, depth: usize) -> ApiResult<Option<Value>> {
        match R::find_by_id(host.services.store.as_ref(), id).await? {
            Some(record) => Ok(Some(handlers::render(host, &record, depth).await?)),
            None => Ok(None),
        }
    }
}

/// Registry for all resources of the application
#[derive(Default)]
pub struct ResourceRegistry {
    descriptors: IndexMap<&'static str, Box<dyn ResourceDescriptor>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; a second registration of a collection replaces the first
    pub fn register(&mut self, descriptor: Box<dyn ResourceDescriptor>) {
        self.descriptors
            .insert(descriptor.collection_name(), descriptor);
    }

    /// Register a resource type
    pub fn register_resource<R: Resource>(&mut self) {
        self.register(Box::new(TypedDescriptor::<R>::new()));
    }

    pub fn get(&self, collection: &str) -> Option<&dyn ResourceDescriptor> {
        self.descriptors.get(collection).map(|d| d.as_ref())
    }

    /// Collection names in registration order
    pub fn collection_names(&self) -> Vec<&str> {
        self.descriptors.keys().copied().collect()
    }

    /// Reject collection names that would clash with framework routes
    pub fn validate(&self) -> Result<()> {
        for name in self.descriptors.keys() {
            if name.is_empty() || name.contains('/') {
                bail!("invalid collection name '{}'", name);
            }
            if RESERVED_COLLECTIONS.contains(name) {
                bail!("collection name '{}' is reserved", name);
            }
        }
        Ok(())
    }

    /// Merge the routes of every registered resource
    pub fn build_routes(&self, prefix: &str) -> Router<Arc<ServerHost>> {
        self.descriptors
            .values()
            .fold(Router::new(), |router, descriptor| {
                router.merge(descriptor.build_routes(prefix))
            })
    }
}
