//! Disk cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The volume holding the cache directory cannot fit the byte budget.
    #[error("insufficient space: need {required} bytes, {available} available")]
    InsufficientSpace {
        /// Requested byte budget.
        required: u64,
        /// Bytes available on the volume.
        available: u64,
    },
    /// The cache directory is missing or not writable.
    #[error("cache directory unusable: {0}")]
    Unusable(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Failed to re-encode an image for storage.
    #[error("Encode error: {0}")]
    EncodeError(String),
}

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}
