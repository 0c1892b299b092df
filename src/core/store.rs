//! Document store contract consumed by resources
//!
//! The framework never talks to a database directly. Every resource reads and
//! writes JSON documents through a [`DocumentStore`], addressed by collection
//! name and selected with a [`Filter`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A persisted record: a JSON object keyed by field name
pub type Document = Map<String, Value>;

/// Name of the identifier field carried by every stored document
pub const ID_FIELD: &str = "_id";

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value
    Eq(String, Value),

    /// Field is absent or differs from the value
    Ne(String, Value),

    /// Field is an array containing the value
    Contains(String, Value),
}

impl Condition {
    /// Check whether a document satisfies this condition
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Condition::Eq(field, value) => document.get(field) == Some(value),
            Condition::Ne(field, value) => document.get(field) != Some(value),
            Condition::Contains(field, value) => match document.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}

/// Conjunction of conditions used to select documents
///
/// An empty filter matches every document.
///
/// # Example
///
/// ```rust,ignore
/// let filter = Filter::new()
///     .eq("email", "someone@example.com")
///     .ne("_id", current_id);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Create a filter matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a document id
    pub fn by_id(id: &str) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.into(), value.into()));
        self
    }

    /// Require `field != value`
    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Ne(field.into(), value.into()));
        self
    }

    /// Require the array `field` to contain `value`
    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Contains(field.into(), value.into()));
        self
    }

    /// Conditions in insertion order
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Check whether a document satisfies every condition
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }
}

/// Persistence collaborator for resources
///
/// Implementations are the single synchronization point between requests:
/// each call must be atomic with respect to the documents it touches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find every document of a collection matching the filter
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Find the first document of a collection matching the filter
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    /// Count the documents of a collection matching the filter
    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        Ok(self.find(collection, filter).await?.len())
    }

    /// Insert or replace a document
    ///
    /// A document without an `_id` receives a fresh one. The stored document
    /// is returned.
    async fn save(&self, collection: &str, document: Document) -> Result<Document>;

    /// Delete a document by id, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;
}

/// Read the `_id` of a document, if present and a string
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}
