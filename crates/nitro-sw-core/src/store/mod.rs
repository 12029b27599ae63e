//! Cache storage for offline responses.
//!
//! Storage holds named caches; each named cache maps a request key (the
//! URL of a GET request) to the last response written for it. Entries never
//! expire. A cache generation is replaced as a whole by bumping its name.
//!
//! Two implementations are provided:
//! - `MemoryCacheStorage`: process-local, counts operations for tests
//! - `DiskCacheStorage`: one JSON file per named cache

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::http::Response;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// A stored value and the time it was written.
/// The timestamp is informational; it never makes an entry stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// One named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, response: &Response) -> Result<(), StoreError>;

    async fn lookup(&self, key: &str) -> Result<Option<CachedData<Response>>, StoreError>;

    async fn match_key(&self, key: &str) -> Result<Option<Response>, StoreError> {
        Ok(self.lookup(key).await?.map(|cached| cached.data))
    }

    /// Keys of all entries, sorted.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// The set of named caches available to the worker.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named cache, creating it empty if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError>;

    /// Look `key` up in every named cache, in `keys()` order, returning the
    /// first hit.
    async fn match_any(&self, key: &str) -> Result<Option<Response>, StoreError>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a named cache. `Ok(false)` when it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// Cache names become file names on disk; keep them to one path segment.
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
