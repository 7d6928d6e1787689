use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use studio_logging::{studio_debug, studio_info};

use super::{
    check_capacity, join_failure, persist_failure, PersistedCollection, Quota, StorageBackend,
    StorageError,
};
use crate::persist::AtomicFileWriter;

pub const LEGACY_STATE_FILE: &str = ".studio_state.ron";

/// Size limit of the legacy store, matching the small key-value stores the
/// collection used to live in.
pub const LEGACY_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

const NAME: &str = "legacy";

/// Fallback backend: a RON dotfile with a small fixed capacity. Cannot
/// report usage, so the chain estimates quota when this is all it has.
pub struct LegacyFileBackend {
    dir: PathBuf,
    capacity: u64,
}

impl LegacyFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, LEGACY_CAPACITY_BYTES)
    }

    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LEGACY_STATE_FILE)
    }
}

#[async_trait]
impl StorageBackend for LegacyFileBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self) -> Result<Option<PersistedCollection>, StorageError> {
        let path = self.path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(NAME, err)),
        };
        let collection: PersistedCollection =
            ron::from_str(&content).map_err(|err| StorageError::serialization(NAME, err))?;
        studio_info!(
            "Loaded {} items from legacy state {:?}",
            collection.items.len(),
            path
        );
        Ok(Some(collection))
    }

    async fn save(&self, collection: &PersistedCollection) -> Result<(), StorageError> {
        let content = ron::ser::to_string(collection)
            .map_err(|err| StorageError::serialization(NAME, err))?;
        check_capacity(NAME, content.len(), self.capacity)?;

        let writer = AtomicFileWriter::new(self.dir.clone());
        tokio::task::spawn_blocking(move || writer.write(LEGACY_STATE_FILE, content.as_bytes()))
            .await
            .map_err(|err| join_failure(NAME, err))?
            .map_err(|err| persist_failure(NAME, err))?;
        studio_debug!("Saved {} items to legacy state", collection.items.len());
        Ok(())
    }

    async fn quota(&self) -> Result<Option<Quota>, StorageError> {
        Ok(None)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let writer = AtomicFileWriter::new(self.dir.clone());
        tokio::task::spawn_blocking(move || writer.remove(LEGACY_STATE_FILE))
            .await
            .map_err(|err| join_failure(NAME, err))?
            .map_err(|err| persist_failure(NAME, err))
    }
}
