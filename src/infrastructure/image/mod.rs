//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with byte-bounded LRU eviction
//! - Disk caching of encoded files with byte and item limits
//! - Sampled decoding and the round-corner transform
//! - Source fetching over HTTP, from asset bundles and local files

pub mod assets;
pub mod cache_service;
pub mod decoder;
pub mod disk_cache;
pub mod fetcher;
pub mod http;
pub mod memory_cache;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use assets::{AssetLease, AssetRegistry, DirAssetSource};
pub use cache_service::{CacheLookup, CacheService};
pub use disk_cache::{CACHE_FILENAME_PREFIX, DiskLruCache, MAX_REMOVALS};
pub use fetcher::{SourceFetcher, SourceFile};
pub use http::ReqwestTransport;
pub use memory_cache::{CacheStats, MemoryImageCache};
