//! Network access for the worker.
//!
//! Strategies only see the `Network` trait. `HttpNetwork` is the real
//! implementation; tests substitute scripted fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::http::{Request, Response};

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform `request`. Any HTTP status is a successful fetch; only a
    /// failure to obtain a response is an error.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Network over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::InvalidRequest(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::InvalidRequest(format!("header {}: {}", name, e)))?;
            builder = builder.header(name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();

        let headers = collect_headers(response.headers());

        let body = response.bytes().await?.to_vec();
        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "Fetched");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}

/// Flatten response headers, joining repeated values with `, `.
/// Values that are not valid UTF-8 are dropped.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            debug!(header = name.as_str(), "Dropping non-UTF-8 header value");
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.append("content-type", HeaderValue::from_static("text/html"));
        headers.append("x-raw", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let collected = collect_headers(&headers);

        assert_eq!(collected["set-cookie"], "a=1, b=2");
        assert_eq!(collected["content-type"], "text/html");
        assert!(!collected.contains_key("x-raw"));
    }

    #[tokio::test]
    async fn test_garbled_response_is_not_connectivity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(b"not http at all\r\n\r\n").await;
                let _ = socket.shutdown().await;
            }
        });

        let network = HttpNetwork::new(Some(Duration::from_secs(5))).unwrap();
        let request = Request::get(Url::parse(&format!("http://{}/", addr)).unwrap());

        let err = network.fetch(&request).await.unwrap_err();
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_new_with_and_without_timeout() {
        assert!(HttpNetwork::new(None).is_ok());
        assert!(HttpNetwork::new(Some(Duration::from_secs(5))).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected_before_sending() {
        let network = HttpNetwork::new(None).unwrap();
        let request = Request::get(Url::parse("http://127.0.0.1:9/").unwrap())
            .with_header("bad header", "x");

        let err = network.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_fetch_error() {
        let network = HttpNetwork::new(Some(Duration::from_secs(2))).unwrap();
        // Port 9 (discard) is closed on test machines
        let request = Request::get(Url::parse("http://127.0.0.1:9/").unwrap());

        let err = network.fetch(&request).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
