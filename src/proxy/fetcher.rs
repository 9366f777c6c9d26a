//! Upstream fetch abstraction.
//!
//! The handler talks to a [`Fetcher`] trait object, so the same pipeline runs
//! whether bytes come straight from the target site or through a relay that
//! fetches on our behalf. Redirects are never followed by any backend; a 3xx
//! comes back as-is so the redirect rewriter can observe it.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// Everything a backend needs to reproduce the client's request upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Upstream status and headers plus the body as a byte stream, so large
/// media never has to be buffered unless a rewriter needs the full text.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl UpstreamResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: BoxStream<'static, std::io::Result<Bytes>>,
    ) -> Self {
        UpstreamResponse {
            status,
            headers,
            body,
        }
    }

    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let body = stream::once(async move { Ok::<_, std::io::Error>(body) }).boxed();
        UpstreamResponse::new(status, headers, body)
    }

    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
            })
            .boxed();
        UpstreamResponse::new(status, headers, body)
    }

    /// Content-Type header value, empty string when absent or unreadable.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Drains the body stream into one buffer. Only called for text kinds
    /// that get rewritten in full.
    pub async fn bytes(mut self) -> std::io::Result<Bytes> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    pub fn into_parts(
        self,
    ) -> (
        StatusCode,
        HeaderMap,
        BoxStream<'static, std::io::Result<Bytes>>,
    ) {
        (self.status, self.headers, self.body)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError>;
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .use_rustls_tls()
        .connect_timeout(std::time::Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to build HTTP client")
}

/// Fetches upstream sites from this host.
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new() -> Self {
        DirectFetcher {
            client: build_client(),
        }
    }

    /// Uses the caller's client. It must have redirect following disabled,
    /// or upstream 3xx responses never reach the rewriting pipeline.
    pub fn with_client(client: reqwest::Client) -> Self {
        DirectFetcher { client }
    }
}

impl Default for DirectFetcher {
    fn default() -> Self {
        DirectFetcher::new()
    }
}

#[async_trait]
impl Fetcher for DirectFetcher {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        let mut request = self.client.request(req.method, &req.url).headers(req.headers);
        if let Some(body) = req.body {
            request = request.body(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(UpstreamResponse::from_reqwest(response))
    }
}

/// Hands every fetch to a relay endpoint. The relay protocol is fetch-by-url
/// only: method, headers and body of the original request are not conveyed,
/// so this backend suits plain resource retrieval, not session traffic.
pub struct RelayFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayFetcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        RelayFetcher {
            client: build_client(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Fetcher for RelayFetcher {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        let relay_url = format!("{}?url={}", self.endpoint, urlencoding::encode(&req.url));
        let response = self
            .client
            .get(&relay_url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(UpstreamResponse::from_reqwest(response))
    }
}
