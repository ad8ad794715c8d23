//! Persistent store adapter
//!
//! Typed JSON reads and writes over a size-constrained [`KeyValueBackend`].
//! Reads never fail: missing or malformed data yields the caller's default.
//! Writes never fail either: capacity errors trigger the degradation policy
//! and anything still unwritable is dropped with a log line, leaving the
//! caller's in-memory state as the source of truth.

use crate::config::StorageConfig;
use crate::error::{Result, TutorError};
use directories::ProjectDirs;
use metrics::increment_counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub mod backend;
pub mod types;

pub use backend::{BackendError, KeyValueBackend, MemoryBackend, SledBackend};
pub use types::{
    WriteOutcome, BOOKMARKS_KEY, DEFAULT_CAPACITY_BYTES, DEFAULT_MAX_SESSIONS_ON_QUOTA,
    LOW_PRIORITY_KEY, PREFERENCES_KEY, PROGRESS_KEY, SESSIONS_KEY,
};

/// JSON key/value store with a capacity degradation policy
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueBackend>,
    max_sessions_on_quota: usize,
}

impl PersistentStore {
    /// Wrap an existing backend
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            max_sessions_on_quota: DEFAULT_MAX_SESSIONS_ON_QUOTA,
        }
    }

    /// Create a store over a fresh in-memory backend
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::storage::PersistentStore;
    ///
    /// let store = PersistentStore::in_memory(1024);
    /// assert!(store.write("answer", &42).is_success());
    /// assert_eq!(store.read("answer", 0), 42);
    /// ```
    pub fn in_memory(capacity_bytes: usize) -> Self {
        Self::new(Arc::new(MemoryBackend::new(capacity_bytes)))
    }

    /// Open the on-disk store described by the configuration
    ///
    /// Uses `storage.path` when set, otherwise the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Storage` if the data directory cannot be resolved
    /// or the database cannot be opened
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = match &config.path {
            Some(path) => path.clone(),
            None => {
                let proj_dirs = ProjectDirs::from("com", "tutorchat", "tutorchat").ok_or_else(
                    || TutorError::Storage("Could not determine data directory".into()),
                )?;
                proj_dirs.data_dir().join("store")
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TutorError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }

        let backend = SledBackend::open(&path, config.capacity_bytes)
            .map_err(|e| TutorError::Storage(e.to_string()))?;
        tracing::debug!(path = %path.display(), capacity = config.capacity_bytes, "Opened local store");

        Ok(Self::new(Arc::new(backend)).with_max_sessions_on_quota(config.max_sessions_on_quota))
    }

    /// Override how many sessions survive a capacity failure
    pub fn with_max_sessions_on_quota(mut self, max: usize) -> Self {
        self.max_sessions_on_quota = max;
        self
    }

    /// Read and decode `key`, substituting `default` when missing or malformed
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.read_raw(key) else {
            return default;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value is malformed, using default");
                default
            }
        }
    }

    /// Read `key` as an untyped JSON value for callers that validate entries
    /// themselves
    pub fn read_value(&self, key: &str) -> Option<Value> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value is not valid JSON, ignoring");
                None
            }
        }
    }

    /// Read the stored string exactly as written
    pub fn read_raw(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read from local store");
                None
            }
        }
    }

    /// Serialize and store `value` under `key`
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> WriteOutcome {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to serialize value, write dropped");
                return WriteOutcome::Dropped;
            }
        };

        match self.backend.set(key, &serialized) {
            Ok(()) => WriteOutcome::Written,
            Err(BackendError::QuotaExceeded { needed, capacity }) => {
                tracing::warn!(key, needed, capacity, "Local store is full, degrading");
                self.write_degraded(key, serialized)
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Write dropped");
                WriteOutcome::Dropped
            }
        }
    }

    /// Remove `key`, logging any failure
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            tracing::warn!(key, error = %e, "Failed to remove key from local store");
        }
    }

    fn write_degraded(&self, key: &str, serialized: String) -> WriteOutcome {
        let payload = if key == SESSIONS_KEY {
            match self.trim_sessions(&serialized) {
                Some(trimmed) => trimmed,
                None => {
                    tracing::error!(key, "Session payload is not an array, write dropped");
                    return WriteOutcome::Dropped;
                }
            }
        } else {
            tracing::info!(key, evicted = LOW_PRIORITY_KEY, "Evicting low-priority data");
            self.remove(LOW_PRIORITY_KEY);
            serialized
        };

        match self.backend.set(key, &payload) {
            Ok(()) => {
                increment_counter!("store_degraded_writes_total", "key" => key.to_string());
                WriteOutcome::Degraded
            }
            Err(e) => {
                tracing::error!(
                    key,
                    error = %e,
                    "Write dropped after degradation; keeping in-memory state only"
                );
                WriteOutcome::Dropped
            }
        }
    }

    /// Keep only the most recently updated sessions, newest first
    fn trim_sessions(&self, serialized: &str) -> Option<String> {
        let Value::Array(mut sessions) = serde_json::from_str::<Value>(serialized).ok()? else {
            return None;
        };

        let before = sessions.len();
        sessions.sort_by_key(|s| {
            std::cmp::Reverse(s.get("updatedAt").and_then(Value::as_i64).unwrap_or(0))
        });
        sessions.truncate(self.max_sessions_on_quota);
        tracing::warn!(
            kept = sessions.len(),
            dropped = before - sessions.len(),
            "Trimmed stored sessions to fit capacity"
        );

        serde_json::to_string(&sessions).ok()
    }
}
