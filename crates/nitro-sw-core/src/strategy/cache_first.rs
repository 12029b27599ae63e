use std::sync::Arc;

use tracing::{debug, error, warn};

use super::PolicyContext;
use crate::error::FetchError;
use crate::http::{Request, Response};
use crate::store::Cache;

/// CDN scripts: versioned by URL, so a cached copy is always valid.
///
/// Hit: served from the CDN cache without touching the network.
/// Miss: fetched, returned, and copied into the CDN cache in the background.
/// A failed fetch on a miss is returned to the caller as is.
pub async fn handle(ctx: &PolicyContext, request: &Request) -> Result<Response, FetchError> {
    let key = request.cache_key();

    if let Some(ref key) = key {
        if let Some(cached) = lookup(ctx, key).await {
            debug!(path = request.url.path(), "Serving CDN resource from cache");
            return Ok(cached);
        }
    }

    let response = ctx.network.fetch(request).await.map_err(|e| {
        error!(url = %request.url, error = %e, "CDN fetch failed");
        e
    })?;

    match key {
        Some(key) if response.is_ok() => ctx.writes.put(
            Arc::clone(&ctx.storage),
            &ctx.versions.cdn_version,
            key,
            response.clone(),
        ),
        Some(_) => {
            debug!(url = %request.url, status = response.status, "Not caching unsuccessful CDN response")
        }
        None => {}
    }

    Ok(response)
}

/// Store errors count as a miss.
async fn lookup(ctx: &PolicyContext, key: &str) -> Option<Response> {
    let cache: Arc<dyn Cache> = match ctx.storage.open(&ctx.versions.cdn_version).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %e, "Failed to open CDN cache");
            return None;
        }
    };
    match cache.match_key(key).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(key = key, error = %e, "CDN cache lookup failed");
            None
        }
    }
}
