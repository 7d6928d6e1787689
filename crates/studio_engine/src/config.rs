use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use studio_core::DEFAULT_NOTIFICATION_TICKS;
use thiserror::Error;

use crate::saver::DEFAULT_SAVE_DEBOUNCE;
use crate::storage::{
    DirectoryBackend, LegacyFileBackend, StorageBackend, StorageChain, LEGACY_CAPACITY_BYTES,
};
use crate::ServiceSettings;

pub const ENV_SERVICE_URL: &str = "STUDIO_SERVICE_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "STUDIO_REQUEST_TIMEOUT_SECS";
pub const ENV_STATE_DIR: &str = "STUDIO_STATE_DIR";

const DEFAULT_STATE_DIR: &str = "./studio_state";
const WORK_SUBDIR: &str = "work";
const PRIMARY_CAPACITY_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidTimeout { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service: ServiceSettings,
    pub state_dir: PathBuf,
    /// Where results without a server-side URL are materialized.
    pub work_dir: PathBuf,
    pub primary_capacity: u64,
    pub legacy_capacity: u64,
    pub save_debounce: Duration,
    pub tick_interval: Duration,
    pub notification_ticks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_with_state_dir(DEFAULT_STATE_DIR)
    }
}

impl EngineConfig {
    pub fn default_with_state_dir(dir: impl AsRef<Path>) -> Self {
        let state_dir = dir.as_ref().to_path_buf();
        Self {
            service: ServiceSettings::default(),
            work_dir: state_dir.join(WORK_SUBDIR),
            state_dir,
            primary_capacity: PRIMARY_CAPACITY_BYTES,
            legacy_capacity: LEGACY_CAPACITY_BYTES,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            tick_interval: Duration::from_millis(100),
            notification_ticks: DEFAULT_NOTIFICATION_TICKS,
        }
    }

    /// Apply `STUDIO_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(ENV_SERVICE_URL) {
            self.service.base_url = url.trim().to_string();
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout {
                    name: ENV_REQUEST_TIMEOUT_SECS,
                    value: value.clone(),
                })?;
            self.service.request_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.set_state_dir(dir.trim());
        }
        Ok(())
    }

    /// Move the state directory; the work directory follows it.
    pub fn set_state_dir(&mut self, dir: impl AsRef<Path>) {
        self.state_dir = dir.as_ref().to_path_buf();
        self.work_dir = self.state_dir.join(WORK_SUBDIR);
    }

    /// Directory store first, legacy dotfile as fallback.
    pub fn storage_chain(&self) -> StorageChain {
        let backends: Vec<Arc<dyn StorageBackend>> = vec![
            Arc::new(DirectoryBackend::new(
                self.state_dir.clone(),
                self.primary_capacity,
            )),
            Arc::new(LegacyFileBackend::with_capacity(
                self.state_dir.clone(),
                self.legacy_capacity,
            )),
        ];
        StorageChain::new(backends).with_estimate_capacity(self.legacy_capacity)
    }
}
