//! Offline caching worker for the Nitro PWA.
//!
//! The worker sits between the page and the network. Every request is
//! classified by host and handled by one of three fixed policies:
//!
//! - dynamic API (`anilist.co`): network only, JSON 503 when offline
//! - CDN scripts (`cdn.jsdelivr.net`): cache first, write-through on miss
//! - everything else: network first, cache and root document as fallback
//!
//! Two named caches hold the data, one per category. Their names carry a
//! generation (`nitro-pwa-static-v7`); bumping a generation in the config
//! is how a new deploy forces clients to re-download that category.
//!
//! Storage, network and page control are traits so the worker can run
//! against in-memory fakes, a disk store, or a real HTTP client.

pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod router;
pub mod store;
pub mod strategy;
pub mod version;
pub mod worker;

pub use clients::{ClientControl, ClientRegistry, WorkerEvent};
pub use config::WorkerConfig;
pub use error::{ConfigError, FetchError, InstallError, StoreError};
pub use http::{Request, Response, API_ERROR_BODY};
pub use lifecycle::{ActivationReport, InstallReport};
pub use manifest::AssetManifest;
pub use network::{HttpNetwork, Network};
pub use router::{HostPattern, Route, Router};
pub use store::{Cache, CacheStorage, CachedData, DiskCacheStorage, MemoryCacheStorage};
pub use version::{CacheVersion, VersionRegistry};
pub use worker::{ServiceWorker, WorkerState};

/// Re-exported so callers can build requests without depending on reqwest.
pub use reqwest::Method;
