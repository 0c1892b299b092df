//! Core module containing the fundamental traits and types of the framework

pub mod auth;
pub mod context;
pub mod error;
pub mod extractors;
pub mod permission;
pub mod resource;
pub mod store;
pub mod validation;

pub use auth::{Argon2Hasher, AuthContext, KeyedLock, PasswordHashing};
pub use context::{RequestContext, Services};
pub use error::{ApiError, ApiResult, Denial, FieldViolation};
pub use permission::Permission;
pub use resource::{FieldSet, Operation, Reference, Resource};
pub use store::{Document, DocumentStore, Filter};
pub use validation::{RuleSet, Validator};
