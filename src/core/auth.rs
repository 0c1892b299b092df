//! Authentication primitives
//!
//! Provides:
//! - Bearer token extraction from request headers
//! - Per-request identity resolution, memoized so storage is queried once
//! - The password hashing collaborator and its Argon2 implementation
//! - Opaque token generation
//! - Per-key mutual exclusion used around token issuance

use crate::core::context::Services;
use crate::core::error::ApiResult;
use crate::resources::User;
use anyhow::{Result, anyhow};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::http::{HeaderMap, header};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OnceCell, OwnedMutexGuard};

/// Length of issued tokens
pub const TOKEN_LENGTH: usize = 64;

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Identity of the current request
///
/// Created by the identity middleware for every request and stored in the
/// request extensions. The token lookup runs on first access only; clones
/// share the cached result.
#[derive(Clone, Default)]
pub struct AuthContext {
    token: Option<String>,
    identity: Arc<OnceCell<Option<User>>>,
}

impl AuthContext {
    /// Build a context from the request headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::with_token(bearer_token(headers))
    }

    pub fn with_token(token: Option<String>) -> Self {
        Self {
            token,
            identity: Arc::new(OnceCell::new()),
        }
    }

    /// Context with an already known identity
    pub fn resolved(user: Option<User>) -> Self {
        Self {
            token: None,
            identity: Arc::new(OnceCell::new_with(Some(user))),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Resolve the acting identity, querying the store at most once
    pub async fn identity(&self, services: &Services) -> ApiResult<Option<&User>> {
        if let Some(cached) = self.identity.get() {
            return Ok(cached.as_ref());
        }
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        let identity = self
            .identity
            .get_or_try_init(|| User::from_token(services, token))
            .await?;
        Ok(identity.as_ref())
    }
}

/// Password hashing collaborator
pub trait PasswordHashing: Send + Sync {
    /// Hash a plaintext password into a self-describing digest
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Check a plaintext password against a digest
    fn verify(&self, plaintext: &str, digest: &str) -> bool;

    /// Whether a stored value is already a digest
    fn is_hashed(&self, value: &str) -> bool;
}

/// Argon2id password hashing producing PHC strings
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Hasher with explicit cost parameters
    pub fn with_costs(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {}", e))?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl PasswordHashing for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| anyhow!("invalid salt: {}", e))?;

        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("password hashing failed: {}", e))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon2()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn is_hashed(&self, value: &str) -> bool {
        value.starts_with("$argon2") && PasswordHash::new(value).is_ok()
    }
}

/// Generate an opaque alphanumeric token from the OS random source
pub fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Async mutual exclusion keyed by string
///
/// Token issuance is a read-modify-write on one identity record; holding the
/// identity's lock for the whole sequence prevents lost token updates.
#[derive(Default)]
pub struct KeyedLock {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| anyhow!("Lock error: {}", e))?;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }
}
