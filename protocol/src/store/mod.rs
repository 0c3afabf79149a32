//! # Share Stores
//!
//! The opaque `share id → blob` store behind the custody server. The
//! interface is deliberately tiny: create-only-if-absent store, retrieve,
//! explicit delete. Overwrite does not exist — a second store of the same
//! share id is always a conflict, never a silent replacement.

mod memory;
mod sled_store;

pub use memory::MemoryShareStore;
pub use sled_store::SledShareStore;

use thiserror::Error;

/// Errors from share-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Empty share id or empty share value.
    #[error("invalid share id or value")]
    Invalid,

    /// Store of a share id that already holds a value.
    #[error("share already exists")]
    AlreadyExists,

    /// Retrieve or delete of a share id with no value.
    #[error("share not found")]
    NotFound,

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Storage contract shared by every backend.
///
/// Implementations must be safe to call from concurrent request handlers;
/// writers to the same key serialize, readers never block each other.
pub trait ShareStore: Send + Sync {
    /// Stores `value` under `id`. Fails with [`StoreError::AlreadyExists`]
    /// if the id is already present — create-only-if-absent.
    fn store(&self, id: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns the value stored under `id`.
    fn retrieve(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Removes the value stored under `id`.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}
