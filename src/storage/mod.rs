//! Storage implementations for different backends

pub mod in_memory;
pub mod json_file;

pub use in_memory::InMemoryStore;
pub use json_file::JsonFileStore;

use std::path::PathBuf;

/// Failures raised by the bundled store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A lock guarding store state was poisoned by a panicking writer
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A loaded document has no string `_id`
    #[error("document without _id in collection '{collection}'")]
    MissingId { collection: String },

    /// A collection data file could not be read or written
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A collection data file does not contain a JSON array of objects
    #[error("malformed data file '{path}': {message}")]
    Malformed { path: PathBuf, message: String },
}
