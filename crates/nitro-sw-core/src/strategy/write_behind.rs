use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::http::Response;
use crate::store::CacheStorage;

/// Cache writes that run after the response has been handed back.
///
/// Each write is its own tokio task. The handles are kept so the host can
/// wait for outstanding writes with [`WriteBehind::settle`]; nothing on the
/// response path ever waits for them.
#[derive(Clone, Default)]
pub struct WriteBehind {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WriteBehind {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        // Handles stay valid even if a holder panicked
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open `cache_name` and store `response` under `key`, in the background.
    pub fn put(
        &self,
        storage: Arc<dyn CacheStorage>,
        cache_name: &str,
        key: String,
        response: Response,
    ) {
        let cache_name = cache_name.to_string();
        let handle = tokio::spawn(async move {
            let cache = match storage.open(&cache_name).await {
                Ok(cache) => cache,
                Err(e) => {
                    warn!(cache = %cache_name, error = %e, "Failed to open cache for write-through");
                    return;
                }
            };
            match cache.put(&key, &response).await {
                Ok(()) => debug!(cache = %cache_name, key = %key, "Cached response"),
                Err(e) => warn!(cache = %cache_name, key = %key, error = %e, "Write-through failed"),
            }
        });

        let mut pending = self.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Number of writes that have not finished yet.
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every write started so far.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Write-through task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCacheStorage;

    #[tokio::test]
    async fn test_settle_waits_for_writes() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let writes = WriteBehind::new();

        for i in 0..3 {
            writes.put(
                storage.clone(),
                "cdn-v1",
                format!("https://cdn.example/{}.js", i),
                Response::new(200, "x"),
            );
        }
        writes.settle().await;

        assert_eq!(writes.pending(), 0);
        let cache = storage.open("cdn-v1").await.unwrap();
        assert_eq!(cache.keys().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_open_is_contained() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let writes = WriteBehind::new();

        writes.put(storage.clone(), "bad/name", "k".to_string(), Response::new(200, ""));
        writes.settle().await;

        assert!(storage.keys().await.unwrap().is_empty());
    }
}
