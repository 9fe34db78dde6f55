use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_rss, ParseError, ParsedFeed};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const USER_AGENT: &str = concat!("gator/", env!("CARGO_PKG_VERSION"));

/// Errors that end a single feed fetch.
///
/// Every variant is terminal for the current tick; nothing is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the caller's timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not a well-formed RSS document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// The HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Retrieves and decodes one feed document.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// GET `url` and parse the body, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<ParsedFeed, FetchError>;
}

/// [`FeedFetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS roots, tests).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<ParsedFeed, FetchError> {
        // The timeout covers connect, headers and the whole body
        let bytes = tokio::time::timeout(timeout, self.fetch_bytes(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed document");
        Ok(parse_rss(&bytes)?)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
