//! User resource: identities, credentials and bearer tokens

use super::story::Story;
use crate::core::auth::generate_token;
use crate::core::context::{RequestContext, Services};
use crate::core::error::{ApiError, ApiResult};
use crate::core::permission::Permission;
use crate::core::resource::{FieldSet, Resource};
use crate::core::store::{Document, Filter};
use crate::core::validation::{FieldFilter, FieldRules, RuleMessages};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const EMAIL_FILTERS: &[FieldFilter] = &[FieldFilter::Trim, FieldFilter::Lowercase];

/// An identity able to authenticate against the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Argon2 digest once saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default)]
    pub admin: bool,

    /// Maximum number of stories; `None` means unlimited
    #[serde(
        default,
        deserialize_with = "deserialize_quota",
        skip_serializing_if = "Option::is_none"
    )]
    pub quota: Option<u64>,

    /// Active tokens, oldest first
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Interpret a raw quota value
///
/// Non-negative integers are kept; anything else (absent, null, negative,
/// fractional, non-numeric) means unlimited.
pub fn normalize_quota(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        _ => None,
    }
}

fn deserialize_quota<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(normalize_quota))
}

/// Lower-case and trim an email address
pub fn normalize_email(email: &str) -> String {
    let normalized = EMAIL_FILTERS
        .iter()
        .fold(Value::from(email), |value, filter| filter.apply(value));
    normalized.as_str().unwrap_or(email).to_string()
}

impl User {
    /// New, unsaved identity
    pub fn new(email: impl AsRef<str>, password: impl Into<String>) -> Self {
        Self {
            email: Some(normalize_email(email.as_ref())),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    /// Verify credentials and issue a new token
    ///
    /// Unknown emails, wrong passwords and malformed bodies all fail the same
    /// way so callers cannot tell which emails exist.
    pub async fn authenticate(services: &Services, credentials: &Document) -> ApiResult<(User, String)> {
        let email = credentials.get("email").and_then(Value::as_str);
        let password = credentials.get("password").and_then(Value::as_str);
        let (Some(email), Some(password)) = (email, password) else {
            return Err(ApiError::wrong_credentials());
        };

        let filter = Filter::new().eq("email", normalize_email(email));
        let user = User::find_one(services.store.as_ref(), &filter)
            .await?
            .ok_or_else(ApiError::wrong_credentials)?;

        let digest = user.password.as_deref().unwrap_or_default();
        if !services.hasher.verify(password, digest) {
            tracing::debug!(email = %email, "authentication rejected");
            return Err(ApiError::wrong_credentials());
        }

        user.issue_token(services).await
    }

    /// Append a fresh token, evicting the oldest beyond the configured limit
    ///
    /// The record is re-read under a per-identity lock so concurrent
    /// authentications of the same identity never lose a token.
    pub async fn issue_token(&self, services: &Services) -> ApiResult<(User, String)> {
        let id = self
            .id()
            .ok_or_else(|| ApiError::Internal(anyhow!("cannot issue a token to an unsaved user")))?;

        let _guard = services.token_locks.lock(id).await?;
        let mut fresh = User::find_by_id(services.store.as_ref(), id)
            .await?
            .ok_or_else(|| ApiError::Internal(anyhow!("user {} disappeared", id)))?;

        let token = generate_token();
        fresh.tokens.push(token.clone());
        let excess = fresh.tokens.len().saturating_sub(services.tokens_limit);
        fresh.tokens.drain(..excess);
        fresh.persist(services).await?;

        tracing::info!(user = %id, tokens = fresh.tokens.len(), "issued token");
        Ok((fresh, token))
    }

    /// Identity owning the token, if any
    pub async fn from_token(services: &Services, token: &str) -> ApiResult<Option<User>> {
        let filter = Filter::new().contains("tokens", token);
        User::find_one(services.store.as_ref(), &filter).await
    }

    /// Every field except the password digest
    pub fn to_profile_json(&self) -> ApiResult<Value> {
        let mut document = self.to_document()?;
        document.remove("password");
        Ok(Value::Object(document))
    }

    /// Create the default administrator when no administrator exists
    pub async fn ensure_admin(
        services: &Services,
        email: &str,
        password: &str,
    ) -> ApiResult<Option<User>> {
        let admins = User::count(services.store.as_ref(), &Filter::new().eq("admin", true)).await?;
        if admins > 0 {
            return Ok(None);
        }

        tracing::info!("No administrators found, creating one");
        let mut admin = User::new(email, password).with_admin(true);
        admin.save(services).await?;
        tracing::warn!(email = %email, password = %password, "created default administrator");

        Ok(Some(admin))
    }

    async fn is_self_or_admin(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        let Some(identity) = ctx.identity().await? else {
            return Ok(Permission::denied());
        };
        Ok(Permission::when(identity.admin || identity.id() == self.id()))
    }
}

#[async_trait]
impl Resource for User {
    fn collection_name() -> &'static str {
        "users"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fillable_fields() -> FieldSet {
        FieldSet::Only(&["email", "password"])
    }

    fn visible_fields() -> FieldSet {
        FieldSet::Only(&["email", "admin", "quota"])
    }

    fn field_filters() -> &'static [(&'static str, &'static [FieldFilter])] {
        &[("email", EMAIL_FILTERS)]
    }

    fn validation_rules(&self) -> FieldRules {
        let unique = match self.id() {
            Some(id) => format!("unique:users,email,{}", id),
            None => "unique:users,email".to_string(),
        };

        let mut rules = FieldRules::new();
        rules.insert("email", format!("required|email|{}", unique));
        rules.insert("password", "required|min:5".to_string());
        rules
    }

    fn validation_messages() -> RuleMessages {
        let mut messages = RuleMessages::new();
        messages.insert(
            "password.min",
            "{{ field }} must be at least {{ argument.0 }} characters long",
        );
        messages
    }

    async fn allow_index(ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::when(ctx.is_admin().await?))
    }

    async fn allow_create(ctx: &RequestContext) -> ApiResult<Permission> {
        Ok(Permission::when(ctx.is_admin().await?))
    }

    async fn allow_show(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_self_or_admin(ctx).await
    }

    async fn allow_update(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_self_or_admin(ctx).await
    }

    async fn allow_delete(&self, ctx: &RequestContext) -> ApiResult<Permission> {
        self.is_self_or_admin(ctx).await
    }

    /// Administrators may also set `quota` and `admin`
    async fn fill_from_request(&mut self, ctx: &RequestContext, body: &Document) -> ApiResult<()> {
        if !ctx.is_admin().await? {
            return Ok(());
        }

        if let Some(quota) = body.get("quota") {
            self.quota = normalize_quota(quota);
        }
        match body.get("admin") {
            Some(Value::Bool(admin)) => self.admin = *admin,
            Some(_) => return Err(ApiError::invalid_body()),
            None => {}
        }
        Ok(())
    }

    async fn before_save(&mut self, services: &Services) -> ApiResult<()> {
        if let Some(email) = &self.email {
            self.email = Some(normalize_email(email));
        }
        if let Some(password) = &self.password {
            if !services.hasher.is_hashed(password) {
                self.password = Some(services.hasher.hash(password)?);
            }
        }
        Ok(())
    }

    /// The token list of a stored identity is only ever changed by
    /// [`User::issue_token`]; every other write keeps what is stored.
    async fn save(&mut self, services: &Services) -> ApiResult<()> {
        self.before_save(services).await?;
        let Some(id) = self.id.clone() else {
            return self.persist(services).await;
        };

        let _guard = services.token_locks.lock(&id).await?;
        if let Some(stored) = User::find_by_id(services.store.as_ref(), &id).await? {
            self.tokens = stored.tokens;
        }
        self.persist(services).await
    }

    /// Stories owned by the user go with it
    async fn before_delete(&self, services: &Services) -> ApiResult<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };

        let stories = Story::find(services.store.as_ref(), &Filter::new().eq("user", id)).await?;
        for story in &stories {
            story.delete(services).await?;
        }
        if !stories.is_empty() {
            tracing::debug!(user = %id, count = stories.len(), "deleted owned stories");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{Argon2Hasher, AuthContext};
    use crate::core::validation::{RuleSet, Validator};
    use crate::storage::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn services(tokens_limit: usize) -> Services {
        let store = Arc::new(InMemoryStore::new());
        Services::new(
            store.clone(),
            Arc::new(Argon2Hasher::with_costs(8, 1, 1).unwrap()),
            Validator::new(RuleSet::builtin(), store),
            tokens_limit,
        )
    }

    fn credentials(email: &str, password: &str) -> Document {
        json!({"email": email, "password": password})
            .as_object()
            .cloned()
            .unwrap()
    }

    async fn saved_user(services: &Services, email: &str) -> User {
        let mut user = User::new(email, "password");
        user.save(services).await.unwrap();
        user
    }

    #[test]
    fn test_normalize_quota() {
        assert_eq!(normalize_quota(&json!(5)), Some(5));
        assert_eq!(normalize_quota(&json!(0)), Some(0));
        assert_eq!(normalize_quota(&json!(3.0)), Some(3));
        assert_eq!(normalize_quota(&json!(-1)), None);
        assert_eq!(normalize_quota(&json!(2.5)), None);
        assert_eq!(normalize_quota(&json!("10")), None);
        assert_eq!(normalize_quota(&json!(null)), None);
    }

    #[test]
    fn test_stored_quota_is_normalized() {
        let user: User = serde_json::from_value(json!({"email": "a@b.com", "quota": -4})).unwrap();
        assert_eq!(user.quota, None);
        let user: User = serde_json::from_value(json!({"email": "a@b.com", "quota": 2})).unwrap();
        assert_eq!(user.quota, Some(2));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Foo@Bar.COM "), "foo@bar.com");
    }

    #[tokio::test]
    async fn test_save_hashes_password_once() {
        let services = services(10);
        let user = saved_user(&services, "A@B.com").await;

        let digest = user.password.clone().unwrap();
        assert!(services.hasher.is_hashed(&digest));
        assert!(services.hasher.verify("password", &digest));
        assert_eq!(user.email.as_deref(), Some("a@b.com"));

        let mut again = user.clone();
        again.save(&services).await.unwrap();
        assert_eq!(again.password, Some(digest));
    }

    #[tokio::test]
    async fn test_safe_and_profile_json_never_expose_password() {
        let services = services(10);
        let user = saved_user(&services, "a@b.com").await;
        let (user, token) = user.issue_token(&services).await.unwrap();

        let safe = user.to_safe_json().unwrap();
        assert!(safe.get("password").is_none());
        assert!(safe.get("tokens").is_none());
        assert_eq!(safe["email"], "a@b.com");

        let profile = user.to_profile_json().unwrap();
        assert!(profile.get("password").is_none());
        assert_eq!(profile["tokens"], json!([token]));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let services = services(10);
        saved_user(&services, "a@b.com").await;

        let (user, token) = User::authenticate(&services, &credentials("A@B.COM", "password"))
            .await
            .unwrap();
        assert_eq!(user.tokens, vec![token.clone()]);

        let found = User::from_token(&services, &token).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_credentials() {
        let services = services(10);
        saved_user(&services, "a@b.com").await;

        for body in [
            credentials("a@b.com", "wrong"),
            credentials("nobody@b.com", "password"),
            json!({"email": "a@b.com"}).as_object().cloned().unwrap(),
        ] {
            let err = User::authenticate(&services, &body).await.unwrap_err();
            assert!(matches!(err, ApiError::AuthenticationFailed { .. }));
            assert_eq!(err.to_string(), "wrong credentials");
        }
    }

    #[tokio::test]
    async fn test_token_history_is_bounded_fifo() {
        let services = services(3);
        let user = saved_user(&services, "a@b.com").await;

        let mut issued = Vec::new();
        for _ in 0..4 {
            let (_, token) = user.issue_token(&services).await.unwrap();
            issued.push(token);
        }

        let stored = User::find_by_id(services.store.as_ref(), user.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.tokens, issued[1..].to_vec());
        assert!(User::from_token(&services, &issued[0]).await.unwrap().is_none());
        assert!(User::from_token(&services, &issued[3]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_token_issuance_keeps_every_token() {
        let services = services(10);
        let user = saved_user(&services, "a@b.com").await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let services = services.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                user.issue_token(&services).await.unwrap().1
            }));
        }
        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }

        let stored = User::find_by_id(services.store.as_ref(), user.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.tokens.len(), 5);
        for token in issued {
            assert!(stored.tokens.contains(&token));
        }
    }

    #[tokio::test]
    async fn test_update_of_stale_copy_keeps_tokens_issued_meanwhile() {
        let services = services(10);
        let user = saved_user(&services, "a@b.com").await;

        // a PUT loads the record, then a login lands before it saves
        let mut loaded = User::find_by_id(services.store.as_ref(), user.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        let (_, token) = user.issue_token(&services).await.unwrap();

        let body = json!({"email": "new@b.com"}).as_object().cloned().unwrap();
        let ctx = RequestContext::new(services.clone(), AuthContext::resolved(Some(user.clone())));
        loaded.fill(&body).unwrap();
        loaded.fill_from_request(&ctx, &body).await.unwrap();
        loaded.validate_fields(&services).await.unwrap();
        loaded.save(&services).await.unwrap();

        assert_eq!(loaded.tokens, vec![token.clone()]);
        let found = User::from_token(&services, &token).await.unwrap().unwrap();
        assert_eq!(found.email.as_deref(), Some("new@b.com"));
    }

    #[tokio::test]
    async fn test_save_ignores_caller_token_list() {
        let services = services(10);
        let user = saved_user(&services, "a@b.com").await;
        let (_, token) = user.issue_token(&services).await.unwrap();

        let mut forged = user.clone();
        forged.tokens = vec!["forged".to_string()];
        forged.save(&services).await.unwrap();

        assert_eq!(forged.tokens, vec![token]);
        assert!(User::from_token(&services, "forged").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validation_rules_exclude_self_from_uniqueness() {
        let services = services(10);
        let user = saved_user(&services, "a@b.com").await;
        assert!(user.validate_fields(&services).await.is_ok());

        let duplicate = User::new("A@b.com", "password");
        match duplicate.validate_fields(&services).await {
            Err(ApiError::Validation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "email");
                assert_eq!(violations[0].validation, "unique");
            }
            other => panic!("expected a uniqueness violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_password_message() {
        let services = services(10);
        match User::new("a@b.com", "abc").validate_fields(&services).await {
            Err(ApiError::Validation(violations)) => {
                assert_eq!(violations[0].field, "password");
                assert_eq!(violations[0].validation, "min");
                assert_eq!(
                    violations[0].message,
                    "password must be at least 5 characters long"
                );
            }
            other => panic!("expected a min violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_admins_set_quota_and_admin() {
        let services = services(10);
        let admin = saved_user(&services, "admin@b.com").await.with_admin(true);
        let plain = saved_user(&services, "plain@b.com").await;
        let body = json!({"quota": 3, "admin": true}).as_object().cloned().unwrap();

        let mut target = User::new("t@b.com", "password");
        let ctx = RequestContext::new(services.clone(), AuthContext::resolved(Some(plain)));
        target.fill_from_request(&ctx, &body).await.unwrap();
        assert_eq!(target.quota, None);
        assert!(!target.admin);

        let ctx = RequestContext::new(services.clone(), AuthContext::resolved(Some(admin)));
        target.fill_from_request(&ctx, &body).await.unwrap();
        assert_eq!(target.quota, Some(3));
        assert!(target.admin);
    }

    #[tokio::test]
    async fn test_ensure_admin_runs_once() {
        let services = services(10);
        let created = User::ensure_admin(&services, "admin@admin.com", "secret")
            .await
            .unwrap()
            .expect("admin should be created");
        assert!(created.admin);

        let again = User::ensure_admin(&services, "admin@admin.com", "secret")
            .await
            .unwrap();
        assert!(again.is_none());

        let (_, token) = User::authenticate(&services, &credentials("admin@admin.com", "secret"))
            .await
            .unwrap();
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_stories() {
        let services = services(10);
        let owner = saved_user(&services, "owner@b.com").await;
        let other = saved_user(&services, "other@b.com").await;

        for user in [&owner, &owner, &other] {
            let mut story = Story {
                body: Some("x".to_string()),
                user: user.id.clone(),
                ..Story::default()
            };
            story.save(&services).await.unwrap();
        }

        assert!(owner.delete(&services).await.unwrap());
        let remaining = Story::find(services.store.as_ref(), &Filter::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user, other.id);
    }
}
