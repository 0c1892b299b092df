//! # Story API
//!
//! A generic REST resource backend: every resource type plugs into one
//! CRUD protocol with per-resource authorization hooks, declarative field
//! validation and bearer-token authentication.
//!
//! ## Features
//!
//! - **Resource contract**: collection name, fillable/visible fields,
//!   query scoping and authorization hooks with generic defaults
//! - **Validation engine**: `required|email|unique:users,email` style rule
//!   expressions, aggregated `422` error lists, pluggable rules
//! - **Token authentication**: Argon2 password digests, bounded FIFO token
//!   history per identity
//! - **Quotas**: per-user story quota with structured `403` diagnostics
//! - **Storage**: in-memory or JSON files behind one `DocumentStore` trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use story_api::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     ServerBuilder::new()
//!         .with_store(InMemoryStore::new())
//!         .register_default_resources()
//!         .serve("127.0.0.1:3000")
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod resources;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ApiError, ApiResult, Argon2Hasher, AuthContext, Document, DocumentStore, FieldSet,
        Filter, Operation, PasswordHashing, Permission, Reference, RequestContext, Resource,
        RuleSet, Services, Validator,
    };
    pub use crate::core::validation::{FieldFilter, FieldRules, Rule, RuleInput, RuleMessages};

    // === Resources ===
    pub use crate::resources::{Story, User};

    // === Storage ===
    pub use crate::storage::{InMemoryStore, JsonFileStore};

    // === Config ===
    pub use crate::config::AppConfig;

    // === Server ===
    pub use crate::server::{ResourceRegistry, ServerBuilder, ServerHost, build_router};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
