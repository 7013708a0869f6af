//! Infrastructure layer with caches, codecs and transport adapters.

/// Application configuration.
pub mod config;
/// Image caching, decoding and fetching.
pub mod image;

pub use self::image::{
    CacheService, DirAssetSource, DiskLruCache, MemoryImageCache, ReqwestTransport,
};
pub use config::{
    AppConfig, CacheConfig, CliArgs, Command, CompressFormat, LoaderConfig, LogLevel,
};
