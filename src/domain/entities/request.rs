//! Domain types for image requests and results.

use std::sync::Arc;

use super::cache_key::{CacheKey, LoadKey, Transform};
use crate::domain::errors::LoadError;

/// Requested decode size. Both dimensions are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    width: u32,
    height: u32,
}

impl TargetSize {
    /// Creates a target size.
    ///
    /// # Errors
    /// Returns `InvalidTargetSize` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, LoadError> {
        if width == 0 || height == 0 {
            return Err(LoadError::InvalidTargetSize {
                width: i64::from(width),
                height: i64::from(height),
            });
        }
        Ok(Self { width, height })
    }

    /// Creates a square target size.
    ///
    /// # Errors
    /// Returns `InvalidTargetSize` if `size` is zero.
    pub fn square(size: u32) -> Result<Self, LoadError> {
        Self::new(size, size)
    }

    /// Target width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl TryFrom<(i64, i64)> for TargetSize {
    type Error = LoadError;

    fn try_from((width, height): (i64, i64)) -> Result<Self, Self::Error> {
        let invalid = || LoadError::InvalidTargetSize { width, height };
        let w = u32::try_from(width).map_err(|_| invalid())?;
        let h = u32::try_from(height).map_err(|_| invalid())?;
        Self::new(w, h)
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single load: what to fetch, how large, and which transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Logical key of the image.
    pub key: LoadKey,
    /// Requested decode size.
    pub size: TargetSize,
    /// Post-decode transform.
    pub transform: Transform,
}

impl LoadRequest {
    /// Creates a request without a transform.
    #[must_use]
    pub fn new(key: impl Into<LoadKey>, size: TargetSize) -> Self {
        Self {
            key: key.into(),
            size,
            transform: Transform::None,
        }
    }

    /// Sets the transform.
    #[must_use]
    pub const fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Memory cache key for this request.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.key, self.transform)
    }
}

/// Lifecycle of a binding task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Created, waiting for a worker slot.
    #[default]
    Pending,
    /// Executing the fetch and decode steps.
    Running,
    /// Produced an image.
    Completed,
    /// Stopped because it was superseded, its target vanished, or the worker
    /// is exiting early.
    Cancelled,
    /// Stopped with an error.
    Failed,
}

impl TaskState {
    /// Returns true once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A decoded image together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Logical key of the image.
    pub key: LoadKey,
    /// The decoded (and possibly transformed) pixels.
    pub image: Arc<image::DynamicImage>,
    /// Tier that satisfied the load.
    pub source: ImageSource,
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from in-memory LRU cache.
    MemoryCache,
    /// Loaded from disk cache.
    DiskCache,
    /// Downloaded from network.
    Network,
    /// Copied from a bundled asset.
    Asset,
    /// Read from a local file.
    File,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
            Self::Asset => write!(f, "asset"),
            Self::File => write!(f, "file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0 ; "zero_both")]
    #[test_case(0, 10 ; "zero_width")]
    #[test_case(10, 0 ; "zero_height")]
    fn test_zero_target_size_rejected(width: u32, height: u32) {
        assert!(matches!(
            TargetSize::new(width, height),
            Err(LoadError::InvalidTargetSize { .. })
        ));
    }

    #[test_case(-1, 10 ; "negative_width")]
    #[test_case(10, -5 ; "negative_height")]
    #[test_case(-3, -3 ; "negative_both")]
    fn test_negative_target_size_rejected(width: i64, height: i64) {
        let result = TargetSize::try_from((width, height));
        match result {
            Err(LoadError::InvalidTargetSize { width: w, height: h }) => {
                assert_eq!((w, h), (width, height));
            }
            other => panic!("expected InvalidTargetSize, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_target_size() {
        let size = TargetSize::try_from((120, 80)).unwrap();
        assert_eq!(size.width(), 120);
        assert_eq!(size.height(), 80);
        assert_eq!(size.to_string(), "120x80");
    }

    #[test]
    fn test_request_cache_key_tracks_transform() {
        let size = TargetSize::square(64).unwrap();
        let plain = LoadRequest::new("https://example.com/x.png", size);
        let round = plain.clone().with_transform(Transform::round_corner(2));
        assert_ne!(plain.cache_key(), round.cache_key());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }
}
