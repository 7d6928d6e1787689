use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use studio_logging::{studio_info, studio_warn};

use super::{
    PersistedCollection, Quota, StorageBackend, StorageError, LEGACY_CAPACITY_BYTES,
};

/// Where a save landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub backend: String,
    /// A higher-ranked backend refused the save first.
    pub fell_back: bool,
}

/// Backends in rank order; rank 0 is the primary.
pub struct StorageChain {
    backends: Vec<Arc<dyn StorageBackend>>,
    estimate_capacity: u64,
    last_saved_bytes: AtomicU64,
}

impl StorageChain {
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self {
            backends,
            estimate_capacity: LEGACY_CAPACITY_BYTES,
            last_saved_bytes: AtomicU64::new(0),
        }
    }

    /// Capacity assumed by the coarse quota estimate.
    pub fn with_estimate_capacity(mut self, capacity: u64) -> Self {
        self.estimate_capacity = capacity;
        self
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Load from the highest-ranked backend holding a collection, moving it
    /// into the primary when it came from further down.
    ///
    /// A stored collection is authoritative even when empty; only a missing
    /// collection or a failing backend passes the search on.
    pub async fn load(&self) -> Option<PersistedCollection> {
        for (rank, backend) in self.backends.iter().enumerate() {
            let collection = match backend.load().await {
                Ok(Some(collection)) => collection,
                Ok(None) => continue,
                Err(err) => {
                    studio_warn!("Loading from {} failed: {}", backend.name(), err);
                    continue;
                }
            };
            if collection.is_empty() {
                studio_info!("{} storage holds an empty collection", backend.name());
                return None;
            }
            studio_info!(
                "Restored {} items from {} storage",
                collection.items.len(),
                backend.name()
            );
            if rank > 0 {
                self.migrate(backend.as_ref(), &collection).await;
            }
            return Some(collection);
        }
        None
    }

    /// Copy `collection` into the primary and retire the source copy, so later
    /// loads are served from the primary alone.
    async fn migrate(&self, from: &dyn StorageBackend, collection: &PersistedCollection) {
        let Some(primary) = self.backends.first() else {
            return;
        };
        if let Err(err) = primary.save(collection).await {
            studio_warn!(
                "Migrating collection from {} to {} failed: {}",
                from.name(),
                primary.name(),
                err
            );
            return;
        }
        studio_info!("Migrated collection from {} to {}", from.name(), primary.name());
        if let Err(err) = from.clear().await {
            studio_warn!("Retiring migrated copy in {} failed: {}", from.name(), err);
        }
    }

    pub async fn save(&self, collection: &PersistedCollection) -> Result<SaveReport, StorageError> {
        let mut quota_failure = None;
        let mut last_failure = None;

        for (rank, backend) in self.backends.iter().enumerate() {
            match backend.save(collection).await {
                Ok(()) => {
                    self.record_size(collection);
                    if rank > 0 {
                        studio_warn!("Collection saved to fallback storage {}", backend.name());
                        self.retire_above(rank).await;
                    }
                    return Ok(SaveReport {
                        backend: backend.name().to_string(),
                        fell_back: rank > 0,
                    });
                }
                Err(err) => {
                    studio_warn!("Saving to {} failed: {}", backend.name(), err);
                    if err.is_quota_exceeded() {
                        quota_failure = Some(err);
                    } else {
                        last_failure = Some(err);
                    }
                }
            }
        }

        match (quota_failure, last_failure) {
            (Some(quota), _) => Err(quota),
            (None, Some(last)) => Err(StorageError::Exhausted {
                last: Box::new(last),
            }),
            (None, None) => Err(StorageError::NoBackends),
        }
    }

    /// Drop the stale copies held by backends ranked above `rank`, so the
    /// next load reaches the fallback write.
    async fn retire_above(&self, rank: usize) {
        for backend in &self.backends[..rank] {
            if let Err(err) = backend.clear().await {
                studio_warn!("Retiring stale copy in {} failed: {}", backend.name(), err);
            }
        }
    }

    /// Usage as reported by the first backend able to; otherwise a coarse
    /// estimate from the size of the last successful save.
    pub async fn quota(&self) -> Quota {
        for backend in &self.backends {
            match backend.quota().await {
                Ok(Some(quota)) => return quota,
                Ok(None) => {}
                Err(err) => studio_warn!("Quota query on {} failed: {}", backend.name(), err),
            }
        }
        let used_bytes = self.last_saved_bytes.load(Ordering::SeqCst);
        Quota {
            used_bytes,
            available_bytes: self.estimate_capacity.saturating_sub(used_bytes),
            estimated: true,
        }
    }

    /// Clear every backend. Failures are logged; the first one is returned
    /// after all backends were attempted.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut first_failure = None;
        for backend in &self.backends {
            if let Err(err) = backend.clear().await {
                studio_warn!("Clearing {} failed: {}", backend.name(), err);
                first_failure.get_or_insert(err);
            }
        }
        self.last_saved_bytes.store(0, Ordering::SeqCst);
        first_failure.map_or(Ok(()), Err)
    }

    fn record_size(&self, collection: &PersistedCollection) {
        let size = serde_json::to_vec(collection).map_or(0, |encoded| encoded.len() as u64);
        self.last_saved_bytes.store(size, Ordering::SeqCst);
    }
}
