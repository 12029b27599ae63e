use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_name, Cache, CacheStorage, CachedData};
use crate::error::StoreError;
use crate::http::Response;

/// Counts of entry-level operations, shared by a storage and its caches.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl StoreStats {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// In-process cache storage.
///
/// Caches are kept in creation order, which is the order `match_any` and
/// `keys` use.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Arc<MemoryCache>>>,
    stats: Arc<StoreStats>,
    undeletable: RwLock<HashSet<String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Make every later `delete(name)` fail, as a browser does when the
    /// storage backend errors.
    pub async fn reject_deletes_of(&self, name: &str) {
        self.undeletable.write().await.insert(name.to_string());
    }

    async fn find(&self, name: &str) -> Option<Arc<MemoryCache>> {
        self.caches
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        check_name(name)?;
        if let Some(cache) = self.find(name).await {
            return Ok(cache);
        }

        let mut caches = self.caches.write().await;
        // Another task may have created it between the two locks
        if let Some(cache) = caches.iter().find(|c| c.name == name) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(MemoryCache {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            stats: Arc::clone(&self.stats),
        });
        caches.push(Arc::clone(&cache));
        Ok(cache)
    }

    async fn match_any(&self, key: &str) -> Result<Option<Response>, StoreError> {
        let caches = self.caches.read().await.clone();
        for cache in caches {
            if let Some(response) = cache.match_key(key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        if self.undeletable.read().await.contains(name) {
            return Err(StoreError::Unavailable(format!("cannot delete {}", name)));
        }
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }
}

#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, CachedData<Response>>>,
    stats: Arc<StoreStats>,
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, response: &Response) -> Result<(), StoreError> {
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .await
            .insert(key.to_string(), CachedData::new(response.clone()));
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<CachedData<Response>>, StoreError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
