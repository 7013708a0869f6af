//! Port for the HTTP transport used to download images.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::LoadResult;

/// A response whose body is consumed chunk by chunk.
#[async_trait]
pub trait HttpBody: Send {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// Declared body length, if known.
    fn content_length(&self) -> Option<u64>;

    /// Returns the next body chunk, or `None` at end of stream.
    async fn chunk(&mut self) -> LoadResult<Option<Bytes>>;
}

/// Issues a single GET per image.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a GET request for `url`.
    async fn get(&self, url: &str) -> LoadResult<Box<dyn HttpBody>>;
}
