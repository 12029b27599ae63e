//! The three caching policies.
//!
//! - `bypass`: dynamic API traffic, never cached
//! - `cache_first`: CDN scripts, immutable by URL
//! - `network_first`: the application's own files, cache as offline net
//!
//! Each policy is a function of a shared [`PolicyContext`] and the request.

pub mod bypass;
pub mod cache_first;
pub mod network_first;
pub mod write_behind;

use std::sync::Arc;

use crate::error::FetchError;
use crate::http::{Request, Response};
use crate::manifest::AssetManifest;
use crate::network::Network;
use crate::router::Route;
use crate::store::CacheStorage;
use crate::version::VersionRegistry;

pub use write_behind::WriteBehind;

/// Everything a policy may touch. Cheap to clone.
#[derive(Clone)]
pub struct PolicyContext {
    pub versions: Arc<VersionRegistry>,
    pub manifest: Arc<AssetManifest>,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub writes: WriteBehind,
}

impl PolicyContext {
    pub async fn dispatch(&self, route: Route, request: &Request) -> Result<Response, FetchError> {
        match route {
            Route::Bypass => bypass::handle(self, request).await,
            Route::CacheFirst => cache_first::handle(self, request).await,
            Route::NetworkFirst => network_first::handle(self, request).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::WorkerConfig;
    use crate::error::StoreError;
    use crate::store::{Cache, MemoryCacheStorage};

    /// Network that answers from a fixed table; unknown URLs fail as if
    /// offline.
    #[derive(Default)]
    pub struct ScriptedNetwork {
        responses: Mutex<HashMap<String, Response>>,
        calls: AtomicUsize,
    }

    impl ScriptedNetwork {
        pub fn offline() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, response: Response) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for ScriptedNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::Network(format!("offline: {}", request.url)))
        }
    }

    /// Storage whose writes never complete. Reads always miss.
    pub struct StalledStorage;

    struct StalledCache {
        name: String,
    }

    #[async_trait]
    impl Cache for StalledCache {
        fn name(&self) -> &str {
            &self.name
        }

        async fn put(&self, _key: &str, _response: &Response) -> Result<(), StoreError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn lookup(
            &self,
            _key: &str,
        ) -> Result<Option<crate::store::CachedData<Response>>, StoreError> {
            Ok(None)
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl CacheStorage for StalledStorage {
        async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
            Ok(Arc::new(StalledCache {
                name: name.to_string(),
            }))
        }

        async fn match_any(&self, _key: &str) -> Result<Option<Response>, StoreError> {
            Ok(None)
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _name: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    pub fn context(
        storage: Arc<MemoryCacheStorage>,
        network: Arc<ScriptedNetwork>,
    ) -> PolicyContext {
        context_with(storage, network)
    }

    pub fn context_with(
        storage: Arc<dyn CacheStorage>,
        network: Arc<ScriptedNetwork>,
    ) -> PolicyContext {
        let config = WorkerConfig::default();
        PolicyContext {
            versions: Arc::new(config.versions.clone()),
            manifest: Arc::new(AssetManifest::from_config(&config).unwrap()),
            storage,
            network,
            writes: WriteBehind::new(),
        }
    }
}
