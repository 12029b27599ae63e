use tracing::error;

use super::PolicyContext;
use crate::error::FetchError;
use crate::http::{Request, Response};

/// Dynamic API traffic: live network only.
///
/// A stale answer would be misleading, so no cache is read or written.
/// When the network fails the page gets an explicit 503 JSON error instead.
pub async fn handle(ctx: &PolicyContext, request: &Request) -> Result<Response, FetchError> {
    match ctx.network.fetch(request).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!(
                url = %request.url,
                offline = e.is_connectivity(),
                error = %e,
                "API request failed, returning error response"
            );
            Ok(Response::api_unavailable())
        }
    }
}
