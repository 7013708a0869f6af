//! Brings the encoded bytes for a key onto local disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageSource, KeyKind, LoadKey};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{HttpTransport, LoadListener};

use super::cache_service::CacheService;

/// Local file holding the encoded bytes of a source image.
#[derive(Debug)]
pub enum SourceFile {
    /// Committed to the raw-source cache.
    Cached(PathBuf),
    /// Downloaded without a raw-source cache; deleted on drop.
    Temporary(TempPath),
    /// A caller-supplied local file.
    Local(PathBuf),
}

impl SourceFile {
    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Cached(path) | Self::Local(path) => path.as_path(),
            Self::Temporary(path) => &**path,
        }
    }
}

/// Downloads network keys, copies asset keys and passes file keys through.
pub struct SourceFetcher {
    cache: Arc<CacheService>,
    transport: Arc<dyn HttpTransport>,
}

impl SourceFetcher {
    /// Creates a fetcher writing into the raw-source cache of `cache`.
    #[must_use]
    pub fn new(cache: Arc<CacheService>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { cache, transport }
    }

    /// Tier a key is served from.
    #[must_use]
    pub fn source_of(key: &LoadKey) -> ImageSource {
        match key.kind() {
            KeyKind::Network => ImageSource::Network,
            KeyKind::Asset => ImageSource::Asset,
            KeyKind::File => ImageSource::File,
        }
    }

    /// Resolves `key` to a local file. `bundle` names the asset bundle used
    /// for `asset://` keys.
    ///
    /// # Errors
    /// Returns `Network`/`HttpStatus` for failed downloads, `AssetNotFound`
    /// for missing assets and `Io` for local failures. A partially written
    /// file is always removed.
    pub async fn fetch(
        &self,
        key: &LoadKey,
        bundle: Option<&str>,
        listener: &dyn LoadListener,
    ) -> LoadResult<SourceFile> {
        match key.kind() {
            KeyKind::Network => self.download(key, listener).await,
            KeyKind::Asset => self.copy_asset(key, bundle).await,
            KeyKind::File => {
                let path = key
                    .file_path()
                    .ok_or_else(|| LoadError::io(format!("not a file key: {key}")))?;
                if !path.is_file() {
                    return Err(LoadError::io(format!("no such file: {}", path.display())));
                }
                Ok(SourceFile::Local(path.to_path_buf()))
            }
        }
    }

    async fn download(&self, key: &LoadKey, listener: &dyn LoadListener) -> LoadResult<SourceFile> {
        let http_cache = self.cache.http_cache();
        if let Some(path) = http_cache.and_then(|c| c.get_file(key.as_str())) {
            trace!(key = %key, "Raw source cache hit");
            return Ok(SourceFile::Cached(path));
        }

        let mut body = self.transport.get(key.as_str()).await?;
        let status = body.status();
        if status != 200 {
            warn!(key = %key, status, "Download rejected");
            return Err(LoadError::HttpStatus { status });
        }

        let staged = match http_cache {
            Some(cache) => cache.stage()?,
            None => NamedTempFile::new()?,
        };
        let mut file = tokio::fs::File::from_std(staged.reopen()?);

        let total = body.content_length();
        let mut downloaded = 0u64;
        while let Some(chunk) = body.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            listener.on_progress_update(key, total, downloaded);
        }
        file.flush().await?;
        drop(file);
        debug!(key = %key, bytes = downloaded, "Download complete");

        match http_cache {
            Some(cache) => cache
                .put_file(key.as_str(), staged)
                .map(SourceFile::Cached)
                .map_err(LoadError::from),
            None => Ok(SourceFile::Temporary(staged.into_temp_path())),
        }
    }

    async fn copy_asset(&self, key: &LoadKey, bundle: Option<&str>) -> LoadResult<SourceFile> {
        let name = key
            .asset_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LoadError::AssetNotFound {
                name: key.to_string(),
            })?;
        let bundle = bundle.ok_or_else(|| LoadError::AssetNotFound {
            name: name.to_string(),
        })?;

        let lease = self.cache.asset_registry().acquire(name, bundle);

        if let Some(path) = self
            .cache
            .http_cache()
            .and_then(|c| c.get_file(key.as_str()))
        {
            trace!(key = %key, "Raw source cache hit");
            return Ok(SourceFile::Cached(path));
        }

        let source = self
            .cache
            .bundle(lease.origin())
            .ok_or_else(|| LoadError::AssetNotFound {
                name: name.to_string(),
            })?;

        let staged = match self.cache.http_cache() {
            Some(cache) => cache.stage()?,
            None => NamedTempFile::new()?,
        };
        let asset_name = name.to_string();
        let staged = tokio::task::spawn_blocking(move || -> LoadResult<NamedTempFile> {
            let bytes = source.open(&asset_name).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LoadError::AssetNotFound {
                    name: asset_name.clone(),
                },
                _ => LoadError::from(e),
            })?;
            let mut staged = staged;
            staged.write_all(&bytes)?;
            staged.flush()?;
            Ok(staged)
        })
        .await
        .map_err(|e| LoadError::io(format!("Asset copy task failed: {e}")))??;

        debug!(key = %key, bundle = lease.origin(), "Copied asset");
        let file = match self.cache.http_cache() {
            Some(cache) => cache
                .put_file(key.as_str(), staged)
                .map(SourceFile::Cached)?,
            None => SourceFile::Temporary(staged.into_temp_path()),
        };
        drop(lease);
        Ok(file)
    }
}
