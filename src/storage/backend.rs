//! Size-constrained key/value backends
//!
//! Both backends account capacity the same way: the sum of key and value byte
//! lengths across every stored entry. A `set` that would push the total past
//! the capacity fails with [`BackendError::QuotaExceeded`] and leaves the
//! previous value in place.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by a key/value backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The write would exceed the backend capacity
    #[error("Storage quota exceeded: need {needed} bytes, capacity {capacity} bytes")]
    QuotaExceeded {
        /// Total bytes the store would hold after the write
        needed: usize,
        /// Configured capacity in bytes
        capacity: usize,
    },

    /// Any other backend failure
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Raw string key/value storage
pub trait KeyValueBackend: Send + Sync {
    /// Fetch a value, `None` when absent
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), BackendError>;
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-process backend used by tests and as a fallback when disk storage is
/// unavailable
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    capacity: usize,
}

impl MemoryBackend {
    /// Create an empty backend with the given capacity in bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity,
        }
    }

    /// Total bytes currently stored
    pub fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(|(k, v)| entry_size(k, v)).sum())
            .unwrap_or(0)
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Backend("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Backend("memory store lock poisoned".to_string()))?;

        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| entry_size(k, v))
            .sum();
        let needed = others + entry_size(key, value);
        if needed > self.capacity {
            return Err(BackendError::QuotaExceeded {
                needed,
                capacity: self.capacity,
            });
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Backend("memory store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// On-disk backend built on an embedded `sled` database
pub struct SledBackend {
    db: sled::Db,
    capacity: usize,
}

impl SledBackend {
    /// Open or create a database at `path`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Backend`] if the database cannot be opened
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, BackendError> {
        let db = sled::open(path)
            .map_err(|e| BackendError::Backend(format!("Failed to open database: {}", e)))?;
        Ok(Self { db, capacity })
    }

    /// Open a throwaway database that is removed when dropped
    pub fn temporary(capacity: usize) -> Result<Self, BackendError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BackendError::Backend(format!("Failed to open database: {}", e)))?;
        Ok(Self { db, capacity })
    }

    fn used_bytes_excluding(&self, key: &str) -> Result<usize, BackendError> {
        let mut total = 0;
        for item in self.db.iter() {
            let (k, v) = item.map_err(|e| BackendError::Backend(e.to_string()))?;
            if k.as_ref() != key.as_bytes() {
                total += k.len() + v.len();
            }
        }
        Ok(total)
    }
}

impl KeyValueBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let value = self
            .db
            .get(key)
            .map_err(|e| BackendError::Backend(format!("Failed to read {}: {}", key, e)))?;

        match value {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| BackendError::Backend(format!("Value for {} is not UTF-8: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let needed = self.used_bytes_excluding(key)? + entry_size(key, value);
        if needed > self.capacity {
            return Err(BackendError::QuotaExceeded {
                needed,
                capacity: self.capacity,
            });
        }

        self.db
            .insert(key, value.as_bytes())
            .map_err(|e| BackendError::Backend(format!("Failed to write {}: {}", key, e)))?;
        self.db
            .flush()
            .map_err(|e| BackendError::Backend(format!("Failed to flush {}: {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.db
            .remove(key)
            .map_err(|e| BackendError::Backend(format!("Failed to remove {}: {}", key, e)))?;
        Ok(())
    }
}
