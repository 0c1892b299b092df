//! Server module for building HTTP servers with auto-registered routes
//!
//! This module provides a `ServerBuilder` that registers:
//! - CRUD routes for every registered resource
//! - the authentication and profile routes
//! - the identity middleware guarding everything but authentication

pub mod builder;
pub mod handlers;
pub mod host;
pub mod middleware;
pub mod registry;
pub mod router;

pub use builder::{ServerBuilder, serve_host};
pub use host::ServerHost;
pub use registry::{ResourceDescriptor, ResourceRegistry, TypedDescriptor};
pub use router::build_router;
