//! Fetch, decode, transform and cache one image.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageSource, LoadRequest, LoadedImage};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::LoadListener;
use crate::infrastructure::image::{
    CacheLookup, CacheService, SourceFetcher, decoder, transform,
};

/// Runs the cache lookup, fetch, sampled decode, transform and memory insert
/// steps for a request, checking for staleness between steps.
pub struct DecodePipeline {
    cache: Arc<CacheService>,
    fetcher: SourceFetcher,
    bundle_id: Option<String>,
    max_decode_bytes: u64,
}

impl DecodePipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        cache: Arc<CacheService>,
        fetcher: SourceFetcher,
        bundle_id: Option<String>,
        max_decode_bytes: u64,
    ) -> Self {
        Self {
            cache,
            fetcher,
            bundle_id,
            max_decode_bytes,
        }
    }

    /// Produces the decoded, downsampled and transformed image for `request`.
    ///
    /// `is_stale` is polled between steps; once it returns true the pipeline
    /// stops with `Cancelled` and skips the memory insert. Running out of
    /// memory evicts the whole memory cache before the error is returned.
    ///
    /// # Errors
    /// Returns `Cancelled`, or the `Network`, `Decode`, `OutOfMemory`, `Io`
    /// or `AssetNotFound` error of the failing step.
    pub async fn resolve(
        &self,
        request: &LoadRequest,
        listener: &dyn LoadListener,
        is_stale: &(dyn Fn() -> bool + Sync),
    ) -> LoadResult<LoadedImage> {
        let result = self.run_steps(request, listener, is_stale).await;
        if let Err(e) = &result
            && e.is_out_of_memory()
        {
            warn!(key = %request.key, error = %e, "Out of memory, evicting memory cache");
            self.cache.clear_memory();
        }
        result
    }

    async fn run_steps(
        &self,
        request: &LoadRequest,
        listener: &dyn LoadListener,
        is_stale: &(dyn Fn() -> bool + Sync),
    ) -> LoadResult<LoadedImage> {
        let checkpoint = || {
            if is_stale() {
                trace!(key = %request.key, "Request went stale");
                Err(LoadError::Cancelled)
            } else {
                Ok(())
            }
        };
        let max_alloc = self.max_decode_bytes;
        let size = request.size;

        checkpoint()?;
        let cache = Arc::clone(&self.cache);
        let (key, transform) = (request.key.clone(), request.transform);
        let from_cache = blocking(move || Ok(cache.lookup(&key, transform))).await?;

        let from_disk = match from_cache {
            CacheLookup::Memory(image) => {
                debug!(key = %request.key, "Resolved from memory cache");
                return Ok(LoadedImage {
                    key: request.key.clone(),
                    image,
                    source: ImageSource::MemoryCache,
                });
            }
            CacheLookup::Disk(path) => Some(
                blocking(move || decoder::decode_sampled(&path, Some(size), max_alloc)).await?,
            ),
            CacheLookup::Miss => None,
        };

        let (decoded, source) = if let Some(image) = from_disk {
            debug!(key = %request.key, "Decoded from disk cache");
            (image, ImageSource::DiskCache)
        } else {
            checkpoint()?;
            let file = self
                .fetcher
                .fetch(&request.key, self.bundle_id.as_deref(), listener)
                .await?;

            checkpoint()?;
            let cache = Arc::clone(&self.cache);
            let key = request.key.clone();
            let image = blocking(move || {
                let image = decoder::decode_sampled(file.path(), Some(size), max_alloc)?;
                cache.add_to_disk(&key, &image);
                Ok(image)
            })
            .await?;
            (image, SourceFetcher::source_of(&request.key))
        };

        checkpoint()?;
        let image = if request.transform.is_identity() {
            decoded
        } else {
            let transform = request.transform;
            blocking(move || transform::apply(decoded, transform, max_alloc)).await?
        };

        checkpoint()?;
        let image = Arc::new(image);
        self.cache
            .add_to_memory(request.cache_key(), Arc::clone(&image));
        debug!(
            key = %request.key,
            source = %source,
            width = image.width(),
            height = image.height(),
            "Image resolved"
        );

        Ok(LoadedImage {
            key: request.key.clone(),
            image,
            source,
        })
    }
}

async fn blocking<T, F>(f: F) -> LoadResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LoadResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LoadError::io(format!("Blocking task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CacheKey, TargetSize, Transform};
    use crate::domain::ports::SimpleLoadListener;
    use crate::domain::ports::mocks::{MemoryAssetSource, MockResponse, MockTransport};
    use crate::infrastructure::config::CacheConfig;
    use crate::infrastructure::image::fixtures::png_bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const URL: &str = "https://example.com/x.png";

    struct Fixture {
        pipeline: DecodePipeline,
        cache: Arc<CacheService>,
        transport: Arc<MockTransport>,
        _temp: TempDir,
    }

    fn fixture(transport: MockTransport, max_decode_bytes: u64) -> Fixture {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(CacheService::open(
            CacheConfig::new("thumbs").with_cache_path(temp.path()),
        ));
        cache.register_bundle(Arc::new(
            MemoryAssetSource::new("app").with_asset("icon.png", png_bytes(32, 32)),
        ));
        let transport = Arc::new(transport);
        let fetcher = SourceFetcher::new(cache.clone(), transport.clone());
        Fixture {
            pipeline: DecodePipeline::new(
                cache.clone(),
                fetcher,
                Some("app".to_string()),
                max_decode_bytes,
            ),
            cache,
            transport,
            _temp: temp,
        }
    }

    fn never() -> impl Fn() -> bool + Sync {
        || false
    }

    #[tokio::test]
    async fn test_network_load_downsamples_and_caches() {
        let f = fixture(
            MockTransport::new().route(URL, MockResponse::ok(&png_bytes(400, 300), 256)),
            u64::MAX,
        );
        let request = LoadRequest::new(URL, TargetSize::new(100, 100).unwrap());

        let loaded = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &never())
            .await
            .unwrap();

        assert_eq!(loaded.source, ImageSource::Network);
        assert_eq!((loaded.image.width(), loaded.image.height()), (200, 150));
        assert!(f.cache.get_from_memory(&request.cache_key()).is_some());
        assert!(f.cache.disk_cache_file(&request.key).is_some());
    }

    #[tokio::test]
    async fn test_transform_isolation() {
        let f = fixture(
            MockTransport::new().route(URL, MockResponse::ok(&png_bytes(64, 48), 1024)),
            u64::MAX,
        );
        let size = TargetSize::square(64).unwrap();
        let plain = LoadRequest::new(URL, size);
        let rounded = LoadRequest::new(URL, size).with_transform(Transform::round_corner(2));

        let first = f
            .pipeline
            .resolve(&plain, &SimpleLoadListener, &never())
            .await
            .unwrap();
        let second = f
            .pipeline
            .resolve(&rounded, &SimpleLoadListener, &never())
            .await
            .unwrap();

        assert_eq!((first.image.width(), first.image.height()), (64, 48));
        assert_eq!((second.image.width(), second.image.height()), (48, 48));
        assert_eq!(second.source, ImageSource::DiskCache);
        assert_eq!(f.cache.memory_stats().unwrap().size, 2);
        assert_eq!(f.cache.disk().unwrap().len(), 1);
        assert_eq!(f.transport.requests(), 1);
        assert_ne!(
            CacheKey::new(&plain.key, plain.transform),
            CacheKey::new(&rounded.key, rounded.transform)
        );
    }

    #[tokio::test]
    async fn test_asset_load() {
        let f = fixture(MockTransport::new(), u64::MAX);
        let request = LoadRequest::new("asset://icon.png", TargetSize::square(32).unwrap());

        let loaded = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &never())
            .await
            .unwrap();

        assert_eq!(loaded.source, ImageSource::Asset);
        assert_eq!(loaded.image.width(), 32);
        assert_eq!(f.cache.asset_registry().ref_count("icon.png"), 0);
    }

    #[tokio::test]
    async fn test_stale_request_skips_memory_insert() {
        let f = fixture(
            MockTransport::new().route(URL, MockResponse::ok(&png_bytes(16, 16), 1024)),
            u64::MAX,
        );
        let request = LoadRequest::new(URL, TargetSize::square(16).unwrap());
        let polls = AtomicUsize::new(0);
        // Goes stale after the fetch step.
        let is_stale = || polls.fetch_add(1, Ordering::SeqCst) >= 2;

        let err = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &is_stale)
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled));
        assert!(f.cache.get_from_memory(&request.cache_key()).is_none());
        assert_eq!(f.transport.requests(), 1);
    }

    #[tokio::test]
    async fn test_memory_entry_short_circuits() {
        let f = fixture(MockTransport::new(), u64::MAX);
        let request = LoadRequest::new(URL, TargetSize::square(16).unwrap())
            .with_transform(Transform::round_corner(2));
        f.cache.add_to_memory(
            request.cache_key(),
            Arc::new(image::DynamicImage::new_rgba8(5, 5)),
        );

        let loaded = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &never())
            .await
            .unwrap();

        assert_eq!(loaded.source, ImageSource::MemoryCache);
        assert_eq!(loaded.image.width(), 5);
        assert_eq!(f.transport.requests(), 0);
        assert!(f.cache.disk_cache_file(&request.key).is_none());
    }

    #[tokio::test]
    async fn test_already_stale_does_nothing() {
        let f = fixture(MockTransport::new(), u64::MAX);
        let request = LoadRequest::new(URL, TargetSize::square(16).unwrap());

        let err = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &|| true)
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled));
        assert_eq!(f.transport.requests(), 0);
    }

    #[tokio::test]
    async fn test_out_of_memory_evicts_memory_cache() {
        let f = fixture(
            MockTransport::new().route(URL, MockResponse::ok(&png_bytes(128, 128), 4096)),
            1024,
        );
        let other = CacheKey::raw(&"other".into());
        f.cache
            .add_to_memory(other.clone(), Arc::new(image::DynamicImage::new_rgba8(2, 2)));

        let request = LoadRequest::new(URL, TargetSize::square(128).unwrap());
        let err = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &never())
            .await
            .unwrap_err();

        assert!(err.is_out_of_memory());
        assert!(f.cache.get_from_memory(&other).is_none());
    }

    #[tokio::test]
    async fn test_network_error_surfaces() {
        let f = fixture(MockTransport::new(), u64::MAX);
        let request = LoadRequest::new(URL, TargetSize::square(16).unwrap());

        let err = f
            .pipeline
            .resolve(&request, &SimpleLoadListener, &never())
            .await
            .unwrap_err();
        assert!(err.is_network_error());
    }
}
