//! Keys naming an image as it moves through the caches.

use std::path::Path;

const CORNER_PREFIX: &str = "Corner_";
const ASSET_SCHEME: &str = "asset://";
const FILE_SCHEME: &str = "file://";

/// Where the encoded bytes behind a [`LoadKey`] come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// `http://` or `https://` resource fetched with a single GET.
    Network,
    /// `asset://name` resource read from a bundled asset source.
    Asset,
    /// Anything else is treated as a local file path (`file://` optional).
    File,
}

/// Caller-supplied identifier naming an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadKey(String);

impl LoadKey {
    /// Creates a new `LoadKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classifies the key by its scheme.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        let lower = self.0.get(..8).unwrap_or(&self.0).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            KeyKind::Network
        } else if lower.starts_with(ASSET_SCHEME) {
            KeyKind::Asset
        } else {
            KeyKind::File
        }
    }

    /// Returns the asset name for `asset://` keys.
    #[must_use]
    pub fn asset_name(&self) -> Option<&str> {
        match self.kind() {
            KeyKind::Asset => self.0.get(ASSET_SCHEME.len()..),
            _ => None,
        }
    }

    /// Returns the local path for file keys.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        match self.kind() {
            KeyKind::File => Some(Path::new(
                self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0),
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LoadKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LoadKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Post-decode pixel operation, keyed separately from the raw decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transform {
    /// The decoded image is used as is.
    #[default]
    None,
    /// Centered square crop with rounded corners of radius `diameter / ratio`.
    /// A ratio of 2 yields a full circle.
    RoundCorner {
        /// Divisor applied to the crop diameter.
        ratio: u32,
    },
}

impl Transform {
    /// Builds a corner transform; ratios of 0 or 1 mean no transform.
    #[must_use]
    pub const fn round_corner(ratio: u32) -> Self {
        if ratio > 1 {
            Self::RoundCorner { ratio }
        } else {
            Self::None
        }
    }

    /// Returns true if the transform leaves pixels untouched.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the corner ratio, if any.
    #[must_use]
    pub const fn ratio(&self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::RoundCorner { ratio } => Some(*ratio),
        }
    }
}

/// Memory cache key: the logical key paired with its transform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: LoadKey,
    transform: Transform,
}

impl CacheKey {
    /// Derives the key for `key` rendered with `transform`.
    #[must_use]
    pub fn new(key: &LoadKey, transform: Transform) -> Self {
        Self {
            key: key.clone(),
            transform,
        }
    }

    /// Key of the untransformed decode.
    #[must_use]
    pub fn raw(key: &LoadKey) -> Self {
        Self::new(key, Transform::None)
    }

    /// The logical key.
    #[must_use]
    pub const fn key(&self) -> &LoadKey {
        &self.key
    }

    /// The transform the cached pixels were rendered with.
    #[must_use]
    pub const fn transform(&self) -> Transform {
        self.transform
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transform.ratio() {
            Some(ratio) => write!(f, "{CORNER_PREFIX}{ratio}_{}", self.key),
            None => write!(f, "{}", self.key),
        }
    }
}
