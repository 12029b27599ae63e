use std::sync::Arc;

use tracing::{debug, info, warn};

use super::PolicyContext;
use crate::error::FetchError;
use crate::http::{url_key, Request, Response};

/// The application's own files: network first, cache as offline safety net.
///
/// A 200 for a static-manifest entry refreshes the static cache in the
/// background. When the fetch fails, the request is looked up in every
/// cache, then the root document is tried so the user lands on the app
/// rather than a browser error page. Only when both are missing does the
/// fetch error reach the caller.
pub async fn handle(ctx: &PolicyContext, request: &Request) -> Result<Response, FetchError> {
    let fetch_error = match ctx.network.fetch(request).await {
        Ok(response) => {
            refresh_static(ctx, request, &response);
            return Ok(response);
        }
        Err(e) => e,
    };

    debug!(url = %request.url, error = %fetch_error, "Network failed, trying cache");

    if let Some(key) = request.cache_key() {
        if let Some(cached) = match_any(ctx, &key).await {
            info!(path = request.url.path(), "Offline: serving from cache");
            return Ok(cached);
        }
    }

    let root = url_key(ctx.manifest.root_document());
    if let Some(cached) = match_any(ctx, &root).await {
        info!(
            path = request.url.path(),
            fallback = %root,
            "Offline: serving root document"
        );
        return Ok(cached);
    }

    Err(fetch_error)
}

fn refresh_static(ctx: &PolicyContext, request: &Request, response: &Response) {
    if response.status != 200 || !ctx.manifest.is_static_asset(&request.url) {
        return;
    }
    if let Some(key) = request.cache_key() {
        ctx.writes.put(
            Arc::clone(&ctx.storage),
            &ctx.versions.static_version,
            key,
            response.clone(),
        );
    }
}

/// Store errors count as a miss.
async fn match_any(ctx: &PolicyContext, key: &str) -> Option<Response> {
    match ctx.storage.match_any(key).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(key = key, error = %e, "Cache lookup failed");
            None
        }
    }
}
