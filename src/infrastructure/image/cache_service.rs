//! The memory, disk and raw-source caches behind one handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheKey, LoadKey, Transform};
use crate::domain::errors::CacheResult;
use crate::domain::ports::AssetSource;
use crate::infrastructure::config::CacheConfig;

use super::assets::AssetRegistry;
use super::disk_cache::DiskLruCache;
use super::memory_cache::{CacheStats, MemoryImageCache};

/// Outcome of a tiered lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Decoded image found in memory.
    Memory(Arc<DynamicImage>),
    /// Encoded file found in the disk tier; decode is up to the caller.
    Disk(PathBuf),
    /// Neither tier has the image.
    Miss,
}

/// Process-wide caches. Construct once at startup and share through `Arc`.
pub struct CacheService {
    config: CacheConfig,
    memory: Option<MemoryImageCache>,
    disk: Option<DiskLruCache>,
    http: Option<DiskLruCache>,
    assets: Arc<AssetRegistry>,
    bundles: RwLock<HashMap<String, Arc<dyn AssetSource>>>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("memory", &self.memory.is_some())
            .field("disk", &self.disk)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl CacheService {
    /// Opens the tiers described by `config`.
    ///
    /// A disk tier that cannot be opened (insufficient space, unwritable
    /// directory) is left out with a warning; loads still work without it.
    #[must_use]
    pub fn open(config: CacheConfig) -> Self {
        let memory = config
            .memory_cache_enabled
            .then(|| MemoryImageCache::new(config.mem_cache_size));

        let disk = if config.disk_cache_enabled {
            open_tier(
                "disk",
                &config.disk_cache_dir(),
                config.disk_cache_size,
                config.disk_cache_item_count,
            )
            .map(|cache| cache.with_compress(config.compress_format, config.compress_quality))
        } else {
            None
        };

        if config.clear_disk_cache_on_start
            && let Some(disk) = &disk
            && let Err(e) = disk.clear()
        {
            warn!(error = %e, "Failed to clear disk cache on start");
        }

        let http = open_tier(
            "http",
            &config.http_cache_dir(),
            config.http_cache_size,
            config.http_cache_item_count,
        );

        info!(
            memory = memory.is_some(),
            disk = disk.is_some(),
            http = http.is_some(),
            "Opened image caches"
        );

        Self {
            config,
            memory,
            disk,
            http,
            assets: Arc::new(AssetRegistry::new()),
            bundles: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration the caches were opened with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Checks memory, then the disk tier.
    #[must_use]
    pub fn lookup(&self, key: &LoadKey, transform: Transform) -> CacheLookup {
        if let Some(image) = self.get_from_memory(&CacheKey::new(key, transform)) {
            return CacheLookup::Memory(image);
        }
        match self.disk.as_ref().and_then(|d| d.get_file(key.as_str())) {
            Some(path) => CacheLookup::Disk(path),
            None => CacheLookup::Miss,
        }
    }

    /// Returns a decoded image from memory.
    #[must_use]
    pub fn get_from_memory(&self, key: &CacheKey) -> Option<Arc<DynamicImage>> {
        self.memory.as_ref()?.get(key)
    }

    /// Inserts a decoded image into memory.
    pub fn add_to_memory(&self, key: CacheKey, image: Arc<DynamicImage>) {
        if let Some(memory) = &self.memory {
            memory.put(key, image);
        }
    }

    /// Re-encodes `image` into the disk tier under the raw key. Failures are
    /// logged; the tier is best-effort.
    pub fn add_to_disk(&self, key: &LoadKey, image: &DynamicImage) {
        if let Some(disk) = &self.disk
            && let Err(e) = disk.put_image(key.as_str(), image)
        {
            warn!(key = %key, error = %e, "Failed to add image to disk cache");
        }
    }

    /// Path of the disk-tier file for `key`, if cached.
    #[must_use]
    pub fn disk_cache_file(&self, key: &LoadKey) -> Option<PathBuf> {
        self.disk.as_ref()?.get_file(key.as_str())
    }

    /// The re-encoded disk tier, when enabled.
    #[must_use]
    pub const fn disk(&self) -> Option<&DiskLruCache> {
        self.disk.as_ref()
    }

    /// Cache of raw downloaded and asset bytes.
    #[must_use]
    pub const fn http_cache(&self) -> Option<&DiskLruCache> {
        self.http.as_ref()
    }

    /// Reference table for assets being served.
    #[must_use]
    pub const fn asset_registry(&self) -> &Arc<AssetRegistry> {
        &self.assets
    }

    /// Makes `source` available to `asset://` loads under its bundle id.
    pub fn register_bundle(&self, source: Arc<dyn AssetSource>) {
        let id = source.bundle_id().to_string();
        debug!(bundle = %id, "Registered asset bundle");
        self.bundles.write().insert(id, source);
    }

    /// Returns the asset source registered for `bundle_id`.
    #[must_use]
    pub fn bundle(&self, bundle_id: &str) -> Option<Arc<dyn AssetSource>> {
        self.bundles.read().get(bundle_id).cloned()
    }

    /// Memory cache statistics, when the tier is enabled.
    #[must_use]
    pub fn memory_stats(&self) -> Option<CacheStats> {
        self.memory.as_ref().map(MemoryImageCache::stats)
    }

    /// Drops every decoded image.
    pub fn clear_memory(&self) {
        if let Some(memory) = &self.memory {
            memory.evict_all();
        }
    }

    /// Removes every file of the disk and raw-source tiers.
    ///
    /// # Errors
    /// Returns `IoError` if a cache directory cannot be listed.
    pub fn clear_disk(&self) -> CacheResult<()> {
        if let Some(disk) = &self.disk {
            disk.clear()?;
        }
        if let Some(http) = &self.http {
            http.clear()?;
        }
        Ok(())
    }

    /// Clears memory and disk.
    ///
    /// # Errors
    /// Returns `IoError` if a cache directory cannot be listed.
    pub fn clear_caches(&self) -> CacheResult<()> {
        self.clear_memory();
        self.clear_disk()?;
        info!("Cleared all image caches");
        Ok(())
    }
}

fn open_tier(name: &str, dir: &Path, max_bytes: u64, max_items: usize) -> Option<DiskLruCache> {
    match DiskLruCache::open(dir, max_bytes) {
        Ok(cache) => Some(cache.with_max_items(max_items)),
        Err(e) => {
            warn!(tier = name, dir = %dir.display(), error = %e, "Running without cache tier");
            None
        }
    }
}
