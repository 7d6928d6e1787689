use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use studio_logging::studio_debug;

use super::{
    check_capacity, join_failure, persist_failure, PersistedCollection, Quota, StorageBackend,
    StorageError,
};
use crate::persist::AtomicFileWriter;

pub const COLLECTION_FILE: &str = "collection.json";

const NAME: &str = "directory";

/// Primary backend: one JSON document in the state directory, replaced
/// atomically on every save.
pub struct DirectoryBackend {
    dir: PathBuf,
    capacity: u64,
}

impl DirectoryBackend {
    pub fn new(dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(COLLECTION_FILE)
    }

    fn writer(&self) -> AtomicFileWriter {
        AtomicFileWriter::new(self.dir.clone())
    }
}

#[async_trait]
impl StorageBackend for DirectoryBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self) -> Result<Option<PersistedCollection>, StorageError> {
        let raw = match tokio::fs::read(self.path()).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(NAME, err)),
        };
        let collection =
            serde_json::from_slice(&raw).map_err(|err| StorageError::serialization(NAME, err))?;
        Ok(Some(collection))
    }

    async fn save(&self, collection: &PersistedCollection) -> Result<(), StorageError> {
        let encoded =
            serde_json::to_vec(collection).map_err(|err| StorageError::serialization(NAME, err))?;
        check_capacity(NAME, encoded.len(), self.capacity)?;

        let writer = self.writer();
        let path = tokio::task::spawn_blocking(move || writer.write(COLLECTION_FILE, &encoded))
            .await
            .map_err(|err| join_failure(NAME, err))?
            .map_err(|err| persist_failure(NAME, err))?;
        studio_debug!("Saved {} items to {}", collection.items.len(), path.display());
        Ok(())
    }

    /// Usage counts every file under the state directory, materialized
    /// results included.
    async fn quota(&self) -> Result<Option<Quota>, StorageError> {
        let dir = self.dir.clone();
        let used_bytes = tokio::task::spawn_blocking(move || dir_usage(&dir))
            .await
            .map_err(|err| join_failure(NAME, err))?
            .map_err(|err| StorageError::io(NAME, err))?;
        Ok(Some(Quota {
            used_bytes,
            available_bytes: self.capacity.saturating_sub(used_bytes),
            estimated: false,
        }))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let writer = self.writer();
        tokio::task::spawn_blocking(move || writer.remove(COLLECTION_FILE))
            .await
            .map_err(|err| join_failure(NAME, err))?
            .map_err(|err| persist_failure(NAME, err))
    }
}

fn dir_usage(dir: &Path) -> io::Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_usage(&entry.path())?;
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}
