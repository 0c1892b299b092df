//! The Resource contract
//!
//! A resource is an entity type exposed through the uniform CRUD protocol.
//! Every hook has a generic default; concrete resources override the ones
//! they need (authorization, query scoping, derived assignment, validation).
//!
//! Records travel between the resource and the store as JSON documents, so a
//! resource only has to be a serde-compatible struct whose identifier is
//! serialized as `_id`.

use crate::core::context::{RequestContext, Services};
use crate::core::error::{ApiError, ApiResult};
use crate::core::permission::Permission;
use crate::core::store::{Document, DocumentStore, Filter, ID_FIELD};
use crate::core::validation::{FieldFilter, FieldRules, RuleMessages, apply_filters};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// CRUD operations a resource may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Index,
    Item,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Index,
        Operation::Item,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];
}

/// A set of field names used for fillability and visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSet {
    /// Every field whose name does not start with `_`
    All,
    /// Exactly these fields, in this order
    Only(&'static [&'static str]),
}

impl FieldSet {
    pub fn includes(&self, field: &str) -> bool {
        match self {
            FieldSet::All => !field.starts_with('_'),
            FieldSet::Only(fields) => fields.contains(&field),
        }
    }
}

/// A field holding the id of a record of another collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub collection: &'static str,
}

/// Behavior every exposed entity type supplies
#[async_trait]
pub trait Resource: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {
    /// Stable collection and path segment
    fn collection_name() -> &'static str;

    /// Operations the dispatcher registers routes for
    fn exposed_operations() -> &'static [Operation] {
        &Operation::ALL
    }

    /// Identifier of a persisted record
    fn id(&self) -> Option<&str>;

    /// Fields a request body may set through [`Resource::fill`]
    fn fillable_fields() -> FieldSet {
        FieldSet::All
    }

    /// Fields included in API output (the id is always included)
    fn visible_fields() -> FieldSet {
        FieldSet::All
    }

    /// Fields rendered as the referenced record instead of its id
    fn references() -> &'static [Reference] {
        &[]
    }

    /// Filters applied to request values before they are copied
    fn field_filters() -> &'static [(&'static str, &'static [FieldFilter])] {
        &[]
    }

    /// Rule expression per field
    fn validation_rules(&self) -> FieldRules {
        FieldRules::new()
    }

    /// Message templates keyed by `field.rule` or `rule`
    fn validation_messages() -> RuleMessages {
        RuleMessages::new()
    }

    // === Queries ===

    /// Records returned by the index route
    async fn index_query(ctx: &RequestContext) -> ApiResult<Vec<Self>> {
        Self::find(ctx.store(), &Filter::new()).await
    }

    /// Record addressed by an item route
    async fn item_query(ctx: &RequestContext) -> ApiResult<Option<Self>> {
        match ctx.id() {
            Some(id) => Self::find_by_id(ctx.store(), id).await,
            None => Ok(None),
        }
    }

    // === Authorization ===

    async fn allow_index(_ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::Allowed)
    }

    async fn allow_create(_ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::Allowed)
    }

    async fn allow_show(&self, _ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::Allowed)
    }

    async fn allow_update(&self, _ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::Allowed)
    }

    async fn allow_delete(&self, _ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::Allowed)
    }

    // === Write path ===

    /// Copy the fillable fields of a request body onto the record
    ///
    /// The id is never taken from the body. A value of the wrong type for a
    /// field makes the body unparseable.
    fn fill(&mut self, body: &Document) -> ApiResult<()> {
        let fillable = Self::fillable_fields();
        let mut body = body.clone();
        for (field, filters) in Self::field_filters() {
            apply_filters(&mut body, field, filters);
        }

        let mut current = self.to_document()?;
        let mut changed = false;

        for (key, value) in body {
            if key != ID_FIELD && fillable.includes(&key) {
                current.insert(key, value);
                changed = true;
            }
        }

        if changed {
            *self = serde_json::from_value(Value::Object(current))
                .map_err(|_| ApiError::invalid_body())?;
        }
        Ok(())
    }

    /// Resource-specific assignment that plain field copying cannot express
    async fn fill_from_request(&mut self, _ctx: &RequestContext, _body: &Document) -> ApiResult<()> {
        Ok(())
    }

    /// Run the validation engine over the current field values
    async fn validate_fields(&self, services: &Services) -> ApiResult<()> {
        let data = self.to_document()?;
        let violations = services
            .validator
            .validate(&data, &self.validation_rules(), &Self::validation_messages())
            .await?;

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(violations))
        }
    }

    /// Last transformation before the record is written
    async fn before_save(&mut self, _services: &Services) -> ApiResult<()> {
        Ok(())
    }

    /// Persist the record, picking up the id assigned by the store
    async fn save(&mut self, services: &Services) -> ApiResult<()> {
        self.before_save(services).await?;
        self.persist(services).await
    }

    /// Write the current state as is, without running [`Resource::before_save`]
    async fn persist(&mut self, services: &Services) -> ApiResult<()> {
        let document = self.to_document()?;
        let saved = services
            .store
            .save(Self::collection_name(), document)
            .await?;
        *self = Self::from_document(saved)?;
        Ok(())
    }

    /// Side effects required before the record disappears
    async fn before_delete(&self, _services: &Services) -> ApiResult<()> {
        Ok(())
    }

    /// Delete the record, returning whether it existed
    async fn delete(&self, services: &Services) -> ApiResult<bool> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        self.before_delete(services).await?;
        Ok(services.store.delete(Self::collection_name(), id).await?)
    }

    // === Serialization ===

    /// Visible fields only, references left as ids
    fn to_safe_json(&self) -> ApiResult<Value> {
        let document = self.to_document()?;
        let safe = match Self::visible_fields() {
            FieldSet::All => document
                .into_iter()
                .filter(|(k, _)| k == ID_FIELD || !k.starts_with('_'))
                .collect(),
            FieldSet::Only(fields) => {
                let mut safe = Document::new();
                if let Some(id) = document.get(ID_FIELD) {
                    safe.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    if let Some(value) = document.get(*field) {
                        safe.insert(field.to_string(), value.clone());
                    }
                }
                safe
            }
        };
        Ok(Value::Object(safe))
    }

    fn to_document(&self) -> ApiResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(document) => Ok(document),
            other => Err(ApiError::Internal(anyhow!(
                "{} serialized to a non-object: {}",
                Self::collection_name(),
                other
            ))),
        }
    }

    fn from_document(document: Document) -> ApiResult<Self> {
        serde_json::from_value(Value::Object(document)).map_err(|e| {
            ApiError::Internal(anyhow!(
                "malformed {} record: {}",
                Self::collection_name(),
                e
            ))
        })
    }

    // === Store helpers ===

    async fn find(store: &dyn DocumentStore, filter: &Filter) -> ApiResult<Vec<Self>> {
        store
            .find(Self::collection_name(), filter)
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect()
    }

    async fn find_one(store: &dyn DocumentStore, filter: &Filter) -> ApiResult<Option<Self>> {
        store
            .find_one(Self::collection_name(), filter)
            .await?
            .map(Self::from_document)
            .transpose()
    }

    async fn find_by_id(store: &dyn DocumentStore, id: &str) -> ApiResult<Option<Self>> {
        Self::find_one(store, &Filter::by_id(id)).await
    }

    async fn count(store: &dyn DocumentStore, filter: &Filter) -> ApiResult<usize> {
        Ok(store.count(Self::collection_name(), filter).await?)
    }
}
