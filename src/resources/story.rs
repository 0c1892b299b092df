//! Story resource: user-owned records subject to a creation quota

use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::permission::Permission;
use crate::core::resource::{FieldSet, Reference, Resource};
use crate::core::store::{Document, Filter};
use crate::core::validation::FieldRules;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A piece of text owned by exactly one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Id of the owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Story {
    fn owned_by(user: &str) -> Filter {
        Filter::new().eq("user", user)
    }

    async fn is_owner_or_admin(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        let Some(identity) = ctx.identity().await? else {
            return Ok(Permission::denied());
        };
        let is_owner = identity.id().is_some() && identity.id() == self.user.as_deref();
        Ok(Permission::when(identity.admin || is_owner))
    }
}

#[async_trait]
impl Resource for Story {
    fn collection_name() -> &'static str {
        "stories"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fillable_fields() -> FieldSet {
        FieldSet::Only(&["body"])
    }

    fn references() -> &'static [Reference] {
        &[Reference {
            field: "user",
            collection: "users",
        }]
    }

    fn validation_rules(&self) -> FieldRules {
        let mut rules = FieldRules::new();
        rules.insert("body", "required".to_string());
        rules.insert("user", "required|exists:users".to_string());
        rules
    }

    /// Administrators see everything (optionally `?user=<id>`), others their own
    async fn index_query(ctx: &RequestContext) -> ApiResult<Vec<Self>> {
        let identity = ctx.identity().await?.ok_or(ApiError::Unauthenticated)?;

        let filter = if identity.admin {
            match ctx.query("user") {
                Some(owner) => Self::owned_by(owner),
                None => Filter::new(),
            }
        } else {
            let own = identity.id().ok_or(ApiError::Unauthenticated)?;
            Self::owned_by(own)
        };

        Self::find(ctx.store(), &filter).await
    }

    /// Quota check
    ///
    /// A quota of 0 forbids creation, no quota means unlimited, otherwise
    /// the owner's current story count must stay below the quota.
    async fn allow_create(ctx: &RequestContext) -> ApiResult<Permission> {
        let Some(identity) = ctx.identity().await? else {
            return Ok(Permission::denied());
        };

        let quota = match identity.quota {
            Some(0) => {
                return Ok(Permission::DeniedWith(
                    json!({"message": "Permission denied", "quota": 0}),
                ));
            }
            None => return Ok(Permission::Allowed),
            Some(quota) => quota,
        };

        let owner = identity.id().ok_or(ApiError::Unauthenticated)?;
        let count = Self::count(ctx.store(), &Self::owned_by(owner)).await? as u64;
        if quota > count {
            return Ok(Permission::Allowed);
        }

        tracing::debug!(user = %owner, quota, count, "story quota exceeded");
        Ok(Permission::DeniedWith(json!({
            "message": "Quota exceeded",
            "quota": quota,
            "storiesCount": count,
        })))
    }

    async fn allow_show(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_owner_or_admin(ctx).await
    }

    async fn allow_update(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_owner_or_admin(ctx).await
    }

    async fn allow_delete(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_owner_or_admin(ctx).await
    }

    /// New stories belong to the acting user
    async fn fill_from_request(&mut self, ctx: &RequestContext, _body: &Document) -> ApiResult<()> {
        if self.user.is_none() {
            let identity = ctx.identity().await?.ok_or(ApiError::Unauthenticated)?;
            self.user = identity.id.clone();
        }
        Ok(())
    }
}
