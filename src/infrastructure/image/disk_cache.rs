//! Disk-backed LRU cache of encoded image files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use sysinfo::Disks;
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::domain::entities::TargetSize;
use crate::domain::errors::{CacheError, CacheResult, LoadResult};
use crate::infrastructure::config::CompressFormat;

use super::decoder;

/// Prefix of every cache file name.
pub const CACHE_FILENAME_PREFIX: &str = "Cache_";

/// Upper bound on evictions performed by a single insertion.
pub const MAX_REMOVALS: usize = 4;

/// Default maximum number of files.
pub const DEFAULT_MAX_ITEMS: usize = 128;

const MAX_FILE_NAME_LEN: usize = 255;
const STAGING_PREFIX: &str = ".staging_";

#[derive(Debug, Clone)]
struct DiskEntry {
    path: PathBuf,
    len: u64,
}

struct DiskIndex {
    entries: LruCache<String, DiskEntry>,
    total_bytes: u64,
}

impl DiskIndex {
    fn insert(&mut self, key: &str, entry: DiskEntry) {
        self.total_bytes += entry.len;
        if let Some(old) = self.entries.put(key.to_string(), entry) {
            self.total_bytes = self.total_bytes.saturating_sub(old.len);
        }
    }

    fn remove(&mut self, key: &str) -> Option<DiskEntry> {
        let entry = self.entries.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.len);
        Some(entry)
    }
}

/// LRU cache mapping keys to files in one directory.
///
/// The index lives in memory and is rebuilt lazily: a file written by a
/// previous run is picked up the first time its key is looked up.
pub struct DiskLruCache {
    dir: PathBuf,
    max_bytes: u64,
    max_items: usize,
    compress_format: CompressFormat,
    compress_quality: u8,
    index: Mutex<DiskIndex>,
}

impl std::fmt::Debug for DiskLruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskLruCache")
            .field("dir", &self.dir)
            .field("max_bytes", &self.max_bytes)
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

impl DiskLruCache {
    /// Opens a cache in `dir` with a budget of `max_bytes`.
    ///
    /// # Errors
    /// Returns `InsufficientSpace` if the volume cannot hold the budget and
    /// `Unusable` if the directory cannot be created or written.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CacheError::Unusable(format!("cannot create {}: {e}", dir.display()))
        })?;

        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&dir)
            .map_err(|e| CacheError::Unusable(format!("{} is not writable: {e}", dir.display())))?;

        if let Some(available) = usable_space(&dir)
            && available <= max_bytes
        {
            return Err(CacheError::InsufficientSpace {
                required: max_bytes,
                available,
            });
        }

        debug!(dir = %dir.display(), max_bytes, "Opened disk cache");
        Ok(Self {
            dir,
            max_bytes,
            max_items: DEFAULT_MAX_ITEMS,
            compress_format: CompressFormat::default(),
            compress_quality: 70,
            index: Mutex::new(DiskIndex {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
        })
    }

    /// Sets the maximum number of files.
    #[must_use]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    /// Sets the format used by [`Self::put_image`].
    #[must_use]
    pub fn with_compress(mut self, format: CompressFormat, quality: u8) -> Self {
        self.compress_format = format;
        self.compress_quality = quality;
        self
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Byte budget.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Deterministic file path for `key` inside `dir`.
    ///
    /// The key is percent-encoded; if the name is too long the part after
    /// the last `/` or `=` is used instead, and failing that a timestamp.
    #[must_use]
    pub fn create_file_path(dir: &Path, key: &str) -> PathBuf {
        let name = encoded_file_name(key).unwrap_or_else(|| {
            format!("{CACHE_FILENAME_PREFIX}{}", Utc::now().timestamp_millis())
        });
        dir.join(name)
    }

    /// Creates an empty staging file in the cache directory. Dropping it
    /// without committing through [`Self::put_file`] deletes it.
    ///
    /// # Errors
    /// Returns `IoError` if the file cannot be created.
    pub fn stage(&self) -> CacheResult<NamedTempFile> {
        Ok(tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)?)
    }

    /// Commits a staged file under `key` and returns its final path.
    ///
    /// If `key` is already present the staged file is discarded and the
    /// existing entry is only promoted.
    ///
    /// # Errors
    /// Returns `IoError` if the staged file cannot be moved into place.
    pub fn put_file(&self, key: &str, staged: NamedTempFile) -> CacheResult<PathBuf> {
        let len = staged.as_file().metadata()?.len();

        let mut index = self.index.lock();
        if let Some(entry) = index.entries.get(key) {
            trace!(key, "Disk cache entry exists, promoting");
            return Ok(entry.path.clone());
        }

        let path = Self::create_file_path(&self.dir, key);
        staged
            .persist(&path)
            .map_err(|e| CacheError::IoError(e.error.to_string()))?;

        index.insert(
            key,
            DiskEntry {
                path: path.clone(),
                len,
            },
        );
        debug!(key, path = %path.display(), len, "Stored file in disk cache");

        self.trim(&mut index);
        Ok(path)
    }

    /// Stores `bytes` under `key`. Re-putting an existing key only refreshes
    /// its recency.
    ///
    /// # Errors
    /// Returns `IoError` if the file cannot be written.
    pub fn put(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        if self.index.lock().entries.get(key).is_some() {
            return Ok(());
        }
        let mut staged = self.stage()?;
        staged.write_all(bytes)?;
        staged.flush()?;
        self.put_file(key, staged)?;
        Ok(())
    }

    /// Re-encodes `image` with the configured format and stores it.
    ///
    /// # Errors
    /// Returns `EncodeError` or `IoError`.
    pub fn put_image(&self, key: &str, image: &DynamicImage) -> CacheResult<()> {
        if self.index.lock().entries.get(key).is_some() {
            return Ok(());
        }
        let bytes = decoder::encode(image, self.compress_format, self.compress_quality)?;
        self.put(key, &bytes)
    }

    /// Returns the file for `key`, promoting it. A file left by an earlier
    /// run is re-registered.
    pub fn get_file(&self, key: &str) -> Option<PathBuf> {
        let mut index = self.index.lock();
        if let Some(entry) = index.entries.get(key) {
            if entry.path.is_file() {
                return Some(entry.path.clone());
            }
            warn!(key, path = %entry.path.display(), "Disk cache file vanished");
            index.remove(key);
            return None;
        }

        let path = Self::create_file_path(&self.dir, key);
        let len = fs::metadata(&path).ok().filter(fs::Metadata::is_file)?.len();
        trace!(key, path = %path.display(), "Re-registering disk cache file");
        index.insert(
            key,
            DiskEntry {
                path: path.clone(),
                len,
            },
        );
        Some(path)
    }

    /// Decodes the file for `key` at its native size.
    ///
    /// # Errors
    /// Returns `Decode`, `Io` or `OutOfMemory` if the file cannot be decoded.
    pub fn get(&self, key: &str) -> LoadResult<Option<DynamicImage>> {
        self.get_sampled(key, None, decoder::DEFAULT_MAX_DECODE_BYTES)
    }

    /// Decodes the file for `key`, downsampled towards `target`. Decoding
    /// happens outside the index lock.
    ///
    /// # Errors
    /// Returns `Decode`, `Io` or `OutOfMemory` if the file cannot be decoded.
    pub fn get_sampled(
        &self,
        key: &str,
        target: Option<TargetSize>,
        max_alloc: u64,
    ) -> LoadResult<Option<DynamicImage>> {
        let Some(path) = self.get_file(key) else {
            trace!(key, "Disk cache miss");
            return Ok(None);
        };
        trace!(key, path = %path.display(), "Disk cache hit");
        decoder::decode_sampled(&path, target, max_alloc).map(Some)
    }

    /// Returns true if `key` is cached. Does not change recency.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        if self.index.lock().entries.contains(key) {
            return true;
        }
        Self::create_file_path(&self.dir, key).is_file()
    }

    /// Removes every file and resets the index.
    ///
    /// # Errors
    /// Returns `IoError` if the directory cannot be listed.
    pub fn clear(&self) -> CacheResult<()> {
        let mut index = self.index.lock();
        index.entries.clear();
        index.total_bytes = 0;
        Self::clear_dir(&self.dir)?;
        debug!(dir = %self.dir.display(), "Cleared disk cache");
        Ok(())
    }

    /// Removes every regular file in `dir`.
    ///
    /// # Errors
    /// Returns `IoError` if the directory cannot be listed.
    pub fn clear_dir(dir: &Path) -> CacheResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file()
                && let Err(e) = fs::remove_file(&path)
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
        Ok(())
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of indexed files.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.index.lock().total_bytes
    }

    fn trim(&self, index: &mut DiskIndex) {
        let mut removals = 0;
        while removals < MAX_REMOVALS
            && (index.entries.len() > self.max_items || index.total_bytes > self.max_bytes)
        {
            let Some((key, entry)) = index.entries.pop_lru() else {
                break;
            };
            index.total_bytes = index.total_bytes.saturating_sub(entry.len);
            if let Err(e) = fs::remove_file(&entry.path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(key = %key, error = %e, "Failed to remove evicted cache file");
            }
            debug!(
                key = %key,
                total_bytes = index.total_bytes,
                items = index.entries.len(),
                "Evicted from disk cache"
            );
            removals += 1;
        }
    }
}

// `*` is dropped before percent-encoding.
fn encoded_file_name(key: &str) -> Option<String> {
    let key = key.replace('*', "");
    let name = format!("{CACHE_FILENAME_PREFIX}{}", urlencoding::encode(&key));
    if name.len() <= MAX_FILE_NAME_LEN {
        return Some(name);
    }

    let tail = key
        .rsplit(['/', '='])
        .next()
        .filter(|t| !t.is_empty() && *t != key)?;
    let name = format!("{CACHE_FILENAME_PREFIX}{}", urlencoding::encode(tail));
    (name.len() <= MAX_FILE_NAME_LEN).then_some(name)
}

/// Free bytes on the volume holding `dir`, if the platform reports it.
#[must_use]
pub fn usable_space(dir: &Path) -> Option<u64> {
    let dir = dir.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}
