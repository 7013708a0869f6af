//! Cache configuration.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "bitmap-loader";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Sub-directory holding raw downloaded and asset bytes.
pub const HTTP_CACHE_DIR: &str = "http";

/// Image format used when re-encoding decoded images for the disk cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressFormat {
    /// Lossy JPEG honouring `compress_quality`.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
    /// Lossless WebP.
    Webp,
}

/// Options for opening the memory and disk caches.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root cache directory. Falls back to the platform cache directory.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Sub-directory of the disk cache under `cache_path`.
    #[serde(default = "default_unique_name")]
    pub unique_name: String,

    /// Memory cache budget in decoded bytes.
    #[serde(default = "default_mem_cache_size")]
    pub mem_cache_size: u64,

    /// Disk cache budget in bytes.
    #[serde(default = "default_disk_cache_size")]
    pub disk_cache_size: u64,

    /// Maximum number of files in the disk cache.
    #[serde(default = "default_item_count")]
    pub disk_cache_item_count: usize,

    /// Budget for raw downloaded bytes, in bytes.
    #[serde(default = "default_http_cache_size")]
    pub http_cache_size: u64,

    /// Maximum number of raw downloaded files.
    #[serde(default = "default_item_count")]
    pub http_cache_item_count: usize,

    /// Format used to re-encode images into the disk cache.
    #[serde(default)]
    pub compress_format: CompressFormat,

    /// Quality (1-100) for lossy formats.
    #[serde(default = "default_compress_quality")]
    pub compress_quality: u8,

    /// Enable the memory tier.
    #[serde(default = "default_true")]
    pub memory_cache_enabled: bool,

    /// Enable the re-encoded disk tier.
    #[serde(default = "default_true")]
    pub disk_cache_enabled: bool,

    /// Wipe the disk tier when the cache is opened.
    #[serde(default)]
    pub clear_disk_cache_on_start: bool,
}

impl CacheConfig {
    /// Creates a configuration with defaults and the given sub-directory name.
    #[must_use]
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            ..Self::default()
        }
    }

    /// Sets the root cache directory.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Returns the effective root cache directory.
    #[must_use]
    pub fn effective_cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(default_cache_root)
    }

    /// Directory of the re-encoded disk tier.
    #[must_use]
    pub fn disk_cache_dir(&self) -> PathBuf {
        self.effective_cache_path().join(&self.unique_name)
    }

    /// Directory of the raw download tier.
    #[must_use]
    pub fn http_cache_dir(&self) -> PathBuf {
        self.effective_cache_path().join(HTTP_CACHE_DIR)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            unique_name: default_unique_name(),
            mem_cache_size: default_mem_cache_size(),
            disk_cache_size: default_disk_cache_size(),
            disk_cache_item_count: default_item_count(),
            http_cache_size: default_http_cache_size(),
            http_cache_item_count: default_item_count(),
            compress_format: CompressFormat::default(),
            compress_quality: default_compress_quality(),
            memory_cache_enabled: true,
            disk_cache_enabled: true,
            clear_disk_cache_on_start: false,
        }
    }
}

/// Returns the platform cache directory for the loader.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
        || std::env::temp_dir().join(APP_NAME).join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

fn default_unique_name() -> String {
    "bitmaps".to_string()
}

const fn default_mem_cache_size() -> u64 {
    5 * 1024 * 1024
}

const fn default_disk_cache_size() -> u64 {
    10 * 1024 * 1024
}

const fn default_http_cache_size() -> u64 {
    50 * 1024 * 1024
}

const fn default_item_count() -> usize {
    128
}

const fn default_compress_quality() -> u8 {
    70
}

fn default_true() -> bool {
    true
}
