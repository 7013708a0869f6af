//! `reqwest` implementation of the HTTP transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER};
use tracing::debug;

use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{HttpBody, HttpTransport};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given connect timeout.
    ///
    /// # Errors
    /// Returns `Network` if the TLS backend cannot be initialised.
    pub fn new(connect_timeout: Duration) -> LoadResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> LoadResult<Box<dyn HttpBody>> {
        debug!(url, "Downloading image");
        let response = self
            .client
            .get(url)
            .header(REFERER, url)
            .send()
            .await
            .map_err(|e| LoadError::network(format!("Request failed: {e}")))?;
        Ok(Box::new(ReqwestBody { response }))
    }
}

struct ReqwestBody {
    response: reqwest::Response,
}

#[async_trait]
impl HttpBody for ReqwestBody {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn chunk(&mut self) -> LoadResult<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|e| LoadError::network(format!("Failed to read body: {e}")))
    }
}
