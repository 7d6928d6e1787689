//! In-memory backend, mainly for tests.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_capacity, PersistedCollection, Quota, StorageBackend, StorageError};

/// Keeps the collection behind a [`RwLock`] so every trait method works on
/// `&self`. Capacity is measured on the JSON encoding. Saves can be made to
/// fail on demand to exercise fallback paths.
pub struct MemoryBackend {
    name: String,
    capacity: u64,
    reports_quota: bool,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    saves: AtomicUsize,
    stored: RwLock<Option<(PersistedCollection, u64)>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: u64::MAX,
            reports_quota: true,
            fail_saves: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
            stored: RwLock::new(None),
        }
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Behave like a backend that cannot measure its own usage.
    pub fn without_quota(mut self) -> Self {
        self.reports_quota = false;
        self
    }

    /// Pre-populate, as if an earlier session had saved `collection`.
    pub fn with_collection(mut self, collection: PersistedCollection) -> Self {
        let size = encoded_len(&collection);
        *self.stored.get_mut() = Some((collection, size));
        self
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of saves that reached storage.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<PersistedCollection> {
        self.stored.read().await.as_ref().map(|(collection, _)| collection.clone())
    }

    fn unavailable(&self, what: &str) -> StorageError {
        StorageError::Unavailable {
            backend: self.name.clone(),
            message: format!("{what} disabled"),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Option<PersistedCollection>, StorageError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(self.unavailable("load"));
        }
        Ok(self.stored().await)
    }

    async fn save(&self, collection: &PersistedCollection) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(self.unavailable("save"));
        }
        let size = encoded_len(collection);
        check_capacity(&self.name, size as usize, self.capacity)?;
        *self.stored.write().await = Some((collection.clone(), size));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quota(&self) -> Result<Option<Quota>, StorageError> {
        if !self.reports_quota {
            return Ok(None);
        }
        let used_bytes = self.stored.read().await.as_ref().map_or(0, |(_, size)| *size);
        Ok(Some(Quota {
            used_bytes,
            available_bytes: self.capacity.saturating_sub(used_bytes),
            estimated: false,
        }))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.stored.write().await = None;
        Ok(())
    }
}

fn encoded_len(collection: &PersistedCollection) -> u64 {
    serde_json::to_vec(collection).map_or(0, |encoded| encoded.len() as u64)
}
