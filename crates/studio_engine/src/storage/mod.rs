//! Ranked persistence backends for the collection.
mod chain;
mod directory;
mod legacy;
mod memory;
mod schema;

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinError;

use crate::persist::PersistError;

pub use chain::{SaveReport, StorageChain};
pub use directory::{DirectoryBackend, COLLECTION_FILE};
pub use legacy::{LegacyFileBackend, LEGACY_CAPACITY_BYTES, LEGACY_STATE_FILE};
pub use memory::MemoryBackend;
pub use schema::{
    PersistedCollection, PersistedItem, PersistedMetadata, PersistedOriginal, SCHEMA_VERSION,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One place the collection can live.
///
/// Backends are tried in rank order by [`StorageChain`]; each one only has
/// to store and return a whole [`PersistedCollection`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when nothing was ever saved here.
    async fn load(&self) -> Result<Option<PersistedCollection>, StorageError>;

    async fn save(&self, collection: &PersistedCollection) -> Result<(), StorageError>;

    /// `Ok(None)` when the backend cannot report usage.
    async fn quota(&self) -> Result<Option<Quota>, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub used_bytes: u64,
    pub available_bytes: u64,
    /// Derived from the last save size rather than reported by a backend.
    pub estimated: bool,
}

impl Quota {
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_MB
    }

    pub fn available_mb(&self) -> f64 {
        self.available_bytes as f64 / BYTES_PER_MB
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend}: storage quota exceeded ({needed} bytes needed, {capacity} allowed)")]
    QuotaExceeded {
        backend: String,
        needed: u64,
        capacity: u64,
    },
    #[error("{backend}: io error: {source}")]
    Io {
        backend: String,
        #[source]
        source: io::Error,
    },
    #[error("{backend}: could not encode or decode collection: {message}")]
    Serialization { backend: String, message: String },
    #[error("{backend}: unavailable: {message}")]
    Unavailable { backend: String, message: String },
    #[error("every storage backend failed; last error: {last}")]
    Exhausted { last: Box<StorageError> },
    #[error("no storage backends configured")]
    NoBackends,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            StorageError::QuotaExceeded { .. } => true,
            StorageError::Exhausted { last } => last.is_quota_exceeded(),
            _ => false,
        }
    }

    pub(crate) fn io(backend: &str, source: io::Error) -> Self {
        StorageError::Io {
            backend: backend.to_string(),
            source,
        }
    }

    pub(crate) fn serialization(backend: &str, message: impl ToString) -> Self {
        StorageError::Serialization {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }
}

/// Reject a payload that would not fit in `capacity` bytes.
pub(crate) fn check_capacity(backend: &str, needed: usize, capacity: u64) -> Result<(), StorageError> {
    let needed = needed as u64;
    if needed > capacity {
        return Err(StorageError::QuotaExceeded {
            backend: backend.to_string(),
            needed,
            capacity,
        });
    }
    Ok(())
}

pub(crate) fn persist_failure(backend: &str, err: PersistError) -> StorageError {
    match err {
        PersistError::Io(source) => StorageError::io(backend, source),
        PersistError::StateDir(message) => StorageError::Unavailable {
            backend: backend.to_string(),
            message,
        },
    }
}

pub(crate) fn join_failure(backend: &str, err: JoinError) -> StorageError {
    StorageError::Unavailable {
        backend: backend.to_string(),
        message: err.to_string(),
    }
}
