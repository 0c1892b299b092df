//! In-memory implementation of DocumentStore for testing and development

use crate::core::store::{Document, DocumentStore, Filter, ID_FIELD, document_id};
use crate::storage::StoreError;
use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Collection = IndexMap<String, Document>;

/// In-memory document store
///
/// Collections keep insertion order so listings are stable. Uses RwLock for
/// thread-safe access; each call holds the lock for its whole duration.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content of a collection
    pub(crate) fn load_collection(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        let mut loaded = Collection::new();
        for document in documents {
            let id = document_id(&document)
                .ok_or_else(|| StoreError::MissingId {
                    collection: collection.to_string(),
                })?
                .to_string();
            loaded.insert(id, document);
        }
        collections.insert(collection.to_string(), loaded);

        Ok(())
    }

    /// Copy every document of a collection, in insertion order
    pub(crate) fn snapshot(&self, collection: &str) -> Result<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;

        Ok(collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;

        Ok(collections
            .get(collection)
            .map(|c| c.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;

        Ok(collections
            .get(collection)
            .and_then(|c| c.values().find(|d| filter.matches(d)).cloned()))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;

        Ok(collections
            .get(collection)
            .map(|c| c.values().filter(|d| filter.matches(d)).count())
            .unwrap_or(0))
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<Document> {
        let id = match document_id(&document) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = Uuid::new_v4().simple().to_string();
                document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, document.clone());

        Ok(document)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        Ok(collections
            .get_mut(collection)
            .and_then(|c| c.shift_remove(id))
            .is_some())
    }
}
