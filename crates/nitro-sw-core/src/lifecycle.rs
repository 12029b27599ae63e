//! Installation and activation.
//!
//! Installation fills both caches from the asset manifest. The static
//! branch is all-or-nothing; the CDN branch keeps whatever it could fetch.
//! The two branches run concurrently and neither can fail the other.
//!
//! Activation removes every named cache that is not a current generation.
//! A cache that refuses deletion stays behind as orphaned storage: it is
//! not retried, and later activations will try again only because it is
//! still not current. There is no other compaction.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};
use url::Url;

use crate::error::InstallError;
use crate::http::{url_key, Request, Response};
use crate::network::Network;
use crate::store::Cache;
use crate::strategy::PolicyContext;

#[derive(Debug)]
pub struct InstallReport {
    /// Number of static entries stored, or why the step failed.
    pub static_result: Result<usize, InstallError>,
    pub cdn_cached: Vec<Url>,
    pub cdn_skipped: Vec<Url>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.static_result.is_ok() && self.cdn_skipped.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Caches whose deletion failed and were left in place.
    pub orphaned: Vec<String>,
}

/// Populate the static and CDN caches. Never fails as a whole; see the
/// report for what was stored.
pub async fn install(ctx: &PolicyContext) -> InstallReport {
    let (static_result, (cdn_cached, cdn_skipped)) =
        tokio::join!(populate_static(ctx), populate_cdn(ctx));

    match static_result {
        Ok(count) => info!(cache = %ctx.versions.static_version, count, "Static assets cached"),
        Err(ref e) => error!(cache = %ctx.versions.static_version, error = %e, "Failed to cache static assets"),
    }

    InstallReport {
        static_result,
        cdn_cached,
        cdn_skipped,
    }
}

async fn populate_static(ctx: &PolicyContext) -> Result<usize, InstallError> {
    let name = &ctx.versions.static_version;
    let cache = ctx
        .storage
        .open(name)
        .await
        .map_err(|source| InstallError::Open {
            name: name.clone(),
            source,
        })?;
    add_all(cache.as_ref(), ctx.network.as_ref(), ctx.manifest.static_assets()).await
}

async fn populate_cdn(ctx: &PolicyContext) -> (Vec<Url>, Vec<Url>) {
    let name = &ctx.versions.cdn_version;
    let assets = ctx.manifest.cdn_assets();

    let cache = match ctx.storage.open(name).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(cache = %name, error = %e, "Failed to open CDN cache, skipping all CDN assets");
            return (Vec::new(), assets.to_vec());
        }
    };

    let results = join_all(assets.iter().map(|url| cache_cdn_asset(&cache, ctx.network.as_ref(), url))).await;

    let mut cached = Vec::new();
    let mut skipped = Vec::new();
    for (url, stored) in assets.iter().zip(results) {
        if stored {
            cached.push(url.clone());
        } else {
            skipped.push(url.clone());
        }
    }
    (cached, skipped)
}

/// Fetch and store one CDN asset. Returns whether it was stored.
async fn cache_cdn_asset(cache: &Arc<dyn Cache>, network: &dyn Network, url: &Url) -> bool {
    let response = match network.fetch(&Request::get(url.clone())).await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "CDN resource not cached");
            return false;
        }
    };
    if response.status != 200 {
        warn!(url = %url, status = response.status, "CDN resource not cached");
        return false;
    }
    match cache.put(&url_key(url), &response).await {
        Ok(()) => true,
        Err(e) => {
            warn!(url = %url, error = %e, "CDN resource not cached");
            false
        }
    }
}

/// Fetch every URL, then store them all. If any fetch fails or returns a
/// non-2xx status nothing is stored.
pub async fn add_all(
    cache: &dyn Cache,
    network: &dyn Network,
    urls: &[Url],
) -> Result<usize, InstallError> {
    let fetched = join_all(urls.iter().map(|url| fetch_ok(network, url))).await;
    let responses: Vec<(&Url, Response)> = urls
        .iter()
        .zip(fetched)
        .map(|(url, result)| result.map(|response| (url, response)))
        .collect::<Result<_, _>>()?;

    for (url, response) in &responses {
        cache
            .put(&url_key(url), response)
            .await
            .map_err(|source| InstallError::Store {
                url: url.to_string(),
                source,
            })?;
    }
    Ok(responses.len())
}

async fn fetch_ok(network: &dyn Network, url: &Url) -> Result<Response, InstallError> {
    let response = network
        .fetch(&Request::get(url.clone()))
        .await
        .map_err(|source| InstallError::Fetch {
            url: url.to_string(),
            source,
        })?;
    if !response.is_ok() {
        return Err(InstallError::from_status(url.as_str(), response.status, &response.body));
    }
    Ok(response)
}

/// Delete every named cache that is not a current generation.
pub async fn activate(ctx: &PolicyContext) -> ActivationReport {
    let names = match ctx.storage.keys().await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "Failed to list caches, nothing cleaned up");
            return ActivationReport::default();
        }
    };

    let stale: Vec<String> = names
        .into_iter()
        .filter(|name| !ctx.versions.is_current(name))
        .collect();

    let results = join_all(stale.iter().map(|name| async move {
        info!(cache = %name, "Deleting old cache");
        ctx.storage.delete(name).await
    }))
    .await;

    let mut report = ActivationReport::default();
    for (name, result) in stale.into_iter().zip(results) {
        match result {
            Ok(_) => report.deleted.push(name),
            Err(e) => {
                warn!(cache = %name, error = %e, "Failed to delete old cache, leaving it in place");
                report.orphaned.push(name);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheStorage, MemoryCacheStorage};
    use crate::strategy::testing::{context, ScriptedNetwork};

    const CHART: &str = "https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.js";
    const PAPA: &str = "https://cdn.jsdelivr.net/npm/papaparse@5.4.1/papaparse.min.js";

    fn all_assets_online() -> ScriptedNetwork {
        ScriptedNetwork::offline()
            .respond("http://localhost:8080/index.html", Response::new(200, "<html>"))
            .respond("http://localhost:8080/sw.js", Response::new(200, "sw"))
            .respond("http://localhost:8080/manifest.json", Response::new(200, "{}"))
            .respond(CHART, Response::new(200, "chart"))
            .respond(PAPA, Response::new(200, "papa"))
    }

    async fn entry_count(storage: &MemoryCacheStorage, name: &str) -> usize {
        storage.open(name).await.unwrap().keys().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_install_populates_both_caches() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let ctx = context(storage.clone(), Arc::new(all_assets_online()));

        let report = install(&ctx).await;

        assert!(report.is_complete());
        assert_eq!(report.static_result.unwrap(), 3);
        assert_eq!(report.cdn_cached.len(), 2);
        assert_eq!(entry_count(&storage, "nitro-pwa-static-v7").await, 3);
        assert_eq!(entry_count(&storage, "nitro-pwa-cdn-v7").await, 2);
    }

    #[tokio::test]
    async fn test_static_failure_stores_nothing_but_cdn_proceeds() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = ScriptedNetwork::offline()
            .respond("http://localhost:8080/index.html", Response::new(200, "<html>"))
            .respond("http://localhost:8080/sw.js", Response::new(200, "sw"))
            .respond(CHART, Response::new(200, "chart"))
            .respond(PAPA, Response::new(200, "papa"));
        let ctx = context(storage.clone(), Arc::new(network));

        let report = install(&ctx).await;

        assert!(matches!(report.static_result, Err(InstallError::Fetch { .. })));
        assert_eq!(entry_count(&storage, "nitro-pwa-static-v7").await, 0);
        assert_eq!(entry_count(&storage, "nitro-pwa-cdn-v7").await, 2);
    }

    #[tokio::test]
    async fn test_static_bad_status_fails_step() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = all_assets_online()
            .respond("http://localhost:8080/manifest.json", Response::new(404, "nope"));
        let ctx = context(storage.clone(), Arc::new(network));

        let report = install(&ctx).await;

        assert!(matches!(
            report.static_result,
            Err(InstallError::Status { status: 404, .. })
        ));
        assert_eq!(entry_count(&storage, "nitro-pwa-static-v7").await, 0);
    }

    #[tokio::test]
    async fn test_cdn_failures_are_skipped_individually() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = ScriptedNetwork::offline()
            .respond("http://localhost:8080/index.html", Response::new(200, "<html>"))
            .respond("http://localhost:8080/sw.js", Response::new(200, "sw"))
            .respond("http://localhost:8080/manifest.json", Response::new(200, "{}"))
            .respond(CHART, Response::new(503, "busy"));
        let ctx = context(storage.clone(), Arc::new(network));

        let report = install(&ctx).await;

        assert!(report.static_result.is_ok());
        assert!(report.cdn_cached.is_empty());
        assert_eq!(report.cdn_skipped.len(), 2);
        assert!(!report.is_complete());
        assert_eq!(entry_count(&storage, "nitro-pwa-cdn-v7").await, 0);
    }

    #[tokio::test]
    async fn test_activate_removes_only_non_current() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let ctx = context(storage.clone(), Arc::new(ScriptedNetwork::offline()));
        for name in [
            "nitro-pwa-static-v6",
            "nitro-pwa-static-v7",
            "nitro-pwa-cdn-v7",
            "nitro-pwa-cdn-v7-backup",
            "unrelated",
        ] {
            storage.open(name).await.unwrap();
        }

        let report = activate(&ctx).await;

        assert_eq!(
            report.deleted,
            vec!["nitro-pwa-static-v6", "nitro-pwa-cdn-v7-backup", "unrelated"]
        );
        assert!(report.orphaned.is_empty());
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["nitro-pwa-static-v7", "nitro-pwa-cdn-v7"]
        );
    }

    #[tokio::test]
    async fn test_failed_delete_is_orphaned_not_fatal() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let ctx = context(storage.clone(), Arc::new(ScriptedNetwork::offline()));
        storage.open("nitro-pwa-static-v5").await.unwrap();
        storage.open("nitro-pwa-static-v6").await.unwrap();
        storage.reject_deletes_of("nitro-pwa-static-v5").await;

        let report = activate(&ctx).await;

        assert_eq!(report.deleted, vec!["nitro-pwa-static-v6"]);
        assert_eq!(report.orphaned, vec!["nitro-pwa-static-v5"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["nitro-pwa-static-v5"]);
    }

    #[tokio::test]
    async fn test_add_all_empty_list() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("v1").await.unwrap();
        let network = ScriptedNetwork::offline();

        assert_eq!(add_all(cache.as_ref(), &network, &[]).await.unwrap(), 0);
        assert_eq!(network.calls(), 0);
    }
}
