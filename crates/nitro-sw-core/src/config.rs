//! Worker configuration.
//!
//! Everything the worker needs to know about its deployment lives in one
//! immutable `WorkerConfig`: the scope the application is served from, the
//! two cache generations, both asset manifests, and the host lists that
//! decide which caching policy a request gets. It is built once at startup
//! and shared by the router, the strategies and the lifecycle phases.
//!
//! Configuration is read from `~/.config/nitro-sw/config.json` when present.
//! Missing fields fall back to the production defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::manifest::AssetManifest;
use crate::router::HostPattern;
use crate::version::VersionRegistry;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "nitro-sw";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_SCOPE: &str = "http://localhost:8080/";
const DEFAULT_ROOT_DOCUMENT: &str = "index.html";
const DEFAULT_STATIC_ASSETS: &[&str] = &["index.html", "sw.js", "manifest.json"];
const DEFAULT_CDN_ASSETS: &[&str] = &[
    "https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.js",
    "https://cdn.jsdelivr.net/npm/papaparse@5.4.1/papaparse.min.js",
];
const DEFAULT_API_HOSTS: &[&str] = &["anilist.co"];
const DEFAULT_CDN_HOSTS: &[&str] = &["cdn.jsdelivr.net"];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the application, including any sub-folder prefix
    /// (`https://user.github.io/nitro/`). Static assets and the root
    /// document are resolved against it.
    pub scope: String,
    pub versions: VersionRegistry,
    /// Paths of the application's own files, relative to `scope`.
    /// A leading `/` or `./` is ignored.
    pub static_assets: Vec<String>,
    /// Absolute URLs of third-party scripts.
    pub cdn_assets: Vec<String>,
    /// Served when offline and the request itself is not cached.
    pub root_document: String,
    /// Hosts whose traffic is never cached (exact or subdomain match).
    pub api_hosts: Vec<String>,
    /// Hosts served cache-first (exact or subdomain match).
    pub cdn_hosts: Vec<String>,
    /// Only applies to the HTTP network adapter. `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            versions: VersionRegistry::default(),
            static_assets: strings(DEFAULT_STATIC_ASSETS),
            cdn_assets: strings(DEFAULT_CDN_ASSETS),
            root_document: DEFAULT_ROOT_DOCUMENT.to_string(),
            api_hosts: strings(DEFAULT_API_HOSTS),
            cdn_hosts: strings(DEFAULT_CDN_HOSTS),
            request_timeout_secs: None,
        }
    }
}

impl WorkerConfig {
    /// Load from `path`, or from the default location, or fall back to
    /// defaults when no file exists there. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::config_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Default location of the disk-backed cache store.
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Check everything that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.versions.validate()?;
        AssetManifest::from_config(self)?;
        for host in self.api_hosts.iter().chain(&self.cdn_hosts) {
            HostPattern::parse(host)?;
        }
        Ok(())
    }
}
