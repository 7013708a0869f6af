//! Errors raised while fetching and decoding an image.

use thiserror::Error;

use super::cache_error::CacheError;

/// Result type for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Load error variants.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("unexpected HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("failed to decode image: {message}")]
    Decode { message: String },

    #[error("out of memory while {stage}")]
    OutOfMemory { stage: String },

    #[error("invalid target size {width}x{height}")]
    InvalidTargetSize { width: i64, height: i64 },

    #[error("no adapter set, call set_adapter() before loading by index")]
    AdapterNotSet,

    #[error("index {index} out of range for adapter with {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("asset not found: {name}")]
    AssetNotFound { name: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates out-of-memory error.
    #[must_use]
    pub fn out_of_memory(stage: impl Into<String>) -> Self {
        Self::OutOfMemory {
            stage: stage.into(),
        }
    }

    /// Creates io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Maps an `image` crate error onto the load taxonomy.
    #[must_use]
    pub fn from_image(error: &image::ImageError) -> Self {
        match error {
            image::ImageError::Limits(e) => Self::out_of_memory(format!("decoding ({e})")),
            image::ImageError::IoError(e) => Self::io(e.to_string()),
            other => Self::decode(other.to_string()),
        }
    }

    /// Returns whether the error is surfaced to listeners rather than treated
    /// as a programmer error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::AdapterNotSet | Self::IndexOutOfRange { .. } | Self::InvalidTargetSize { .. }
        )
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::HttpStatus { .. })
    }

    /// Returns whether the error is an allocation failure.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

impl From<std::io::Error> for LoadError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<CacheError> for LoadError {
    fn from(error: CacheError) -> Self {
        Self::io(error.to_string())
    }
}
