use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{check_name, Cache, CacheStorage, CachedData};
use crate::error::StoreError;
use crate::http::Response;

type Entries = BTreeMap<String, CachedData<Response>>;

/// Cache storage persisted as `<root>/<cache name>.json`.
///
/// Writes within one process are serialized by a shared lock and land via
/// rename, so a reader never sees a half-written file. Nothing coordinates
/// separate processes.
pub struct DiskCacheStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    fn handle(&self, name: &str) -> DiskCache {
        DiskCache {
            name: name.to_string(),
            path: self.cache_path(name),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        check_name(name)?;
        let cache = self.handle(name);
        {
            let _guard = self.write_lock.lock().await;
            if !tokio::fs::try_exists(&cache.path).await? {
                debug!(cache = name, "Creating cache file");
                write_entries(&cache.path, &Entries::new()).await?;
            }
        }
        Ok(Arc::new(cache))
    }

    async fn match_any(&self, key: &str) -> Result<Option<Response>, StoreError> {
        for name in self.keys().await? {
            if let Some(response) = self.handle(&name).match_key(key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Sorted by name; creation order is not recorded on disk.
    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.cache_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

struct DiskCache {
    name: String,
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskCache {
    /// A deleted cache reads as empty.
    async fn load(&self) -> Result<Entries, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            name: self.name.clone(),
            source,
        })
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, response: &Response) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), CachedData::new(response.clone()));
        write_entries(&self.path, &entries).await
    }

    async fn lookup(&self, key: &str) -> Result<Option<CachedData<Response>>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load().await?.into_keys().collect())
    }
}

async fn write_entries(path: &Path, entries: &Entries) -> Result<(), StoreError> {
    let contents = serde_json::to_vec(entries).map_err(|source| StoreError::Corrupt {
        name: path.display().to_string(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
