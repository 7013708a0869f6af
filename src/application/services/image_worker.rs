//! Facade binding images to widgets.
//!
//! [`ImageWorker`] checks the memory cache synchronously and otherwise binds a
//! background task to the widget. Finished tasks are queued to a
//! [`UiDispatcher`], which the host pumps on the thread that owns its widgets.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::DynamicImage;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    ImageSource, LoadKey, LoadRequest, LoadedImage, TargetSize, TaskState, Transform,
};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{
    AssetSource, HttpTransport, ImageAdapter, ImageTarget, LoadListener, SimpleLoadListener,
    TargetId,
};
use crate::infrastructure::config::LoaderConfig;
use crate::infrastructure::image::{CacheService, SourceFetcher};

use super::binding::{BindOutcome, BindingTable, BindingTask, TaskId, TaskOutcome, TaskResult};
use super::decode_pipeline::DecodePipeline;

/// What [`ImageWorker::load_image`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadHandle {
    /// Served from memory and already applied to the widget.
    Cached,
    /// A new task was bound to the widget.
    Started(TaskId),
    /// The widget is already loading the same image.
    AlreadyLoading(TaskId),
}

#[derive(Default)]
struct DisplayOptions {
    loading: Option<Arc<DynamicImage>>,
    failed: Option<Arc<DynamicImage>>,
    fade_in: bool,
}

struct WorkerShared {
    cache: Arc<CacheService>,
    pipeline: DecodePipeline,
    bindings: BindingTable,
    semaphore: Arc<Semaphore>,
    exit_early: AtomicBool,
    display: RwLock<DisplayOptions>,
    outcomes: mpsc::UnboundedSender<TaskOutcome>,
}

/// Loads images into widgets through the cache tiers.
pub struct ImageWorker {
    shared: Arc<WorkerShared>,
    runtime: Handle,
    default_size: TargetSize,
    corner_ratio: u32,
    adapter: RwLock<Option<Arc<dyn ImageAdapter>>>,
}

impl std::fmt::Debug for ImageWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageWorker")
            .field("default_size", &self.default_size)
            .field("corner_ratio", &self.corner_ratio)
            .field("bound", &self.shared.bindings.len())
            .finish_non_exhaustive()
    }
}

impl ImageWorker {
    /// Creates a worker on the current Tokio runtime, together with the
    /// dispatcher that applies its results.
    ///
    /// When `assets` is given it is registered with the cache service and
    /// used for `asset://` keys.
    ///
    /// # Errors
    /// Returns `InvalidTargetSize` if the configured default size is zero,
    /// or `Io` when called outside a Tokio runtime.
    pub fn new(
        config: &LoaderConfig,
        cache: Arc<CacheService>,
        transport: Arc<dyn HttpTransport>,
        assets: Option<Arc<dyn AssetSource>>,
    ) -> LoadResult<(Self, UiDispatcher)> {
        let default_size = TargetSize::new(config.target_width, config.target_height)?;
        let runtime = Handle::try_current()
            .map_err(|e| LoadError::io(format!("No Tokio runtime available: {e}")))?;

        let bundle_id = assets.map(|source| {
            let id = source.bundle_id().to_string();
            cache.register_bundle(source);
            id
        });

        let fetcher = SourceFetcher::new(Arc::clone(&cache), transport);
        let pipeline = DecodePipeline::new(
            Arc::clone(&cache),
            fetcher,
            bundle_id,
            config.max_decode_bytes,
        );

        let (outcomes, outcome_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WorkerShared {
            cache,
            pipeline,
            bindings: BindingTable::new(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            exit_early: AtomicBool::new(false),
            display: RwLock::new(DisplayOptions {
                fade_in: config.fade_in,
                ..DisplayOptions::default()
            }),
            outcomes,
        });

        info!(
            size = %default_size,
            corner_ratio = config.corner_ratio,
            max_tasks = config.max_concurrent_tasks,
            "Image worker ready"
        );

        let dispatcher = UiDispatcher {
            rx: outcome_rx,
            shared: Arc::clone(&shared),
        };
        let worker = Self {
            shared,
            runtime,
            default_size,
            corner_ratio: config.corner_ratio,
            adapter: RwLock::new(None),
        };
        Ok((worker, dispatcher))
    }

    /// Request for `key` with the configured size and corner ratio.
    #[must_use]
    pub fn default_request(&self, key: impl Into<LoadKey>) -> LoadRequest {
        LoadRequest::new(key, self.default_size)
            .with_transform(Transform::round_corner(self.corner_ratio))
    }

    /// Loads `key` into `target` with the default size and transform.
    pub fn load_image(
        &self,
        key: impl Into<LoadKey>,
        target: &Arc<dyn ImageTarget>,
        listener: Option<Arc<dyn LoadListener>>,
    ) -> LoadHandle {
        self.load_image_with(self.default_request(key), target, listener)
    }

    /// Loads the adapter item at `index` into `target`.
    ///
    /// # Errors
    /// Returns `AdapterNotSet` if no adapter was set, or `IndexOutOfRange` if
    /// the adapter has no item at `index`.
    pub fn load_image_at(
        &self,
        index: usize,
        target: &Arc<dyn ImageTarget>,
        listener: Option<Arc<dyn LoadListener>>,
    ) -> LoadResult<LoadHandle> {
        let adapter = self.adapter.read().clone().ok_or(LoadError::AdapterNotSet)?;
        let key = adapter.item(index).ok_or_else(|| LoadError::IndexOutOfRange {
            index,
            len: adapter.len(),
        })?;
        Ok(self.load_image(key, target, listener))
    }

    /// Loads `request` into `target`.
    ///
    /// A memory hit is applied before returning: the listener sees
    /// `on_start`, `on_loaded` and `on_set` and any task still bound to the
    /// widget is cancelled. Otherwise the loading placeholder is shown and a
    /// task is bound, unless the widget is already loading the same image.
    pub fn load_image_with(
        &self,
        request: LoadRequest,
        target: &Arc<dyn ImageTarget>,
        listener: Option<Arc<dyn LoadListener>>,
    ) -> LoadHandle {
        let listener = listener.unwrap_or_else(|| Arc::new(SimpleLoadListener));
        let cache_key = request.cache_key();

        if let Some(image) = self.shared.cache.get_from_memory(&cache_key) {
            self.shared.bindings.cancel(target.id());
            trace!(key = %cache_key, target = %target.id(), "Memory hit");
            listener.on_start(Some(target), &request.key);
            listener.on_loaded(Some(target), &image);
            target.show_image(Arc::clone(&image), false);
            listener.on_set(target, &image);
            return LoadHandle::Cached;
        }

        let (id, cancel) = match self.shared.bindings.bind(target.id(), &cache_key) {
            BindOutcome::AlreadyLoading(task) => return LoadHandle::AlreadyLoading(task),
            BindOutcome::Bound { task, cancel } => (task, cancel),
        };

        listener.on_start(Some(target), &request.key);
        target.show_placeholder(self.shared.display.read().loading.clone());

        let task = BindingTask::new(id, request, target, cancel, listener);
        debug!(task = %id, key = %cache_key, target = %target.id(), "Bound load task");
        self.spawn(task);
        LoadHandle::Started(id)
    }

    fn spawn(&self, mut task: BindingTask) {
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            let result = match Arc::clone(&shared.semaphore).acquire_owned().await {
                Ok(_permit) => {
                    task.transition(TaskState::Running);
                    let is_stale = || task.is_stale(&shared.bindings, &shared.exit_early);
                    match shared
                        .pipeline
                        .resolve(task.request(), task.listener(), &is_stale)
                        .await
                    {
                        Ok(loaded) => TaskResult::Completed(loaded),
                        Err(LoadError::Cancelled) => TaskResult::Cancelled,
                        Err(e) => TaskResult::Failed(e),
                    }
                }
                Err(_) => TaskResult::Cancelled,
            };

            if shared.outcomes.send(TaskOutcome { task, result }).is_err() {
                trace!("Dispatcher dropped, discarding task outcome");
            }
        });
    }

    /// Loads `request` without a widget, bypassing the binding table.
    ///
    /// The listener sees `on_start` followed by `on_loaded`, `on_error` or
    /// `on_cancelled` (when tasks are exiting early).
    ///
    /// # Errors
    /// Returns the error of the failing pipeline step, or `Cancelled`.
    pub async fn get_image_bitmap(
        &self,
        request: &LoadRequest,
        listener: Option<&dyn LoadListener>,
    ) -> LoadResult<LoadedImage> {
        let listener = listener.unwrap_or(&SimpleLoadListener);
        listener.on_start(None, &request.key);

        if let Some(image) = self.shared.cache.get_from_memory(&request.cache_key()) {
            listener.on_loaded(None, &image);
            return Ok(LoadedImage {
                key: request.key.clone(),
                image,
                source: ImageSource::MemoryCache,
            });
        }

        let exit_early = &self.shared.exit_early;
        let is_stale = || exit_early.load(Ordering::Acquire);
        match self.shared.pipeline.resolve(request, listener, &is_stale).await {
            Ok(loaded) => {
                listener.on_loaded(None, &loaded.image);
                Ok(loaded)
            }
            Err(LoadError::Cancelled) => {
                listener.on_cancelled(None, &request.key);
                Err(LoadError::Cancelled)
            }
            Err(e) => {
                warn!(key = %request.key, error = %e, "Direct load failed");
                listener.on_error(&request.key, &e);
                Err(e)
            }
        }
    }

    /// Disk-tier file for `key`, if cached.
    #[must_use]
    pub fn get_disk_cache_file(&self, key: &LoadKey) -> Option<PathBuf> {
        self.shared.cache.disk_cache_file(key)
    }

    /// Cancels whatever task is bound to `target`.
    pub fn cancel_work(&self, target: TargetId) -> Option<TaskId> {
        self.shared.bindings.cancel(target)
    }

    /// Placeholder shown while a task runs. `None` clears the widget instead.
    pub fn set_loading_image(&self, image: Option<Arc<DynamicImage>>) {
        self.shared.display.write().loading = image;
    }

    /// Placeholder shown when a bound load fails.
    pub fn set_load_failed_image(&self, image: Option<Arc<DynamicImage>>) {
        self.shared.display.write().failed = image;
    }

    /// Enables or disables the cross-fade for images applied by the dispatcher.
    pub fn set_image_fade_in(&self, fade_in: bool) {
        self.shared.display.write().fade_in = fade_in;
    }

    /// While set, tasks stop at their next step and completions are dropped.
    pub fn set_exit_tasks_early(&self, exit_early: bool) {
        debug!(exit_early, "Exit tasks early changed");
        self.shared.exit_early.store(exit_early, Ordering::Release);
    }

    /// Sets the adapter used by [`ImageWorker::load_image_at`].
    pub fn set_adapter(&self, adapter: Option<Arc<dyn ImageAdapter>>) {
        *self.adapter.write() = adapter;
    }

    /// The cache service shared with the pipeline.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheService> {
        &self.shared.cache
    }
}

/// Applies finished tasks to their widgets on the host's UI thread.
pub struct UiDispatcher {
    rx: mpsc::UnboundedReceiver<TaskOutcome>,
    shared: Arc<WorkerShared>,
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("queued", &self.rx.len())
            .finish_non_exhaustive()
    }
}

impl UiDispatcher {
    /// Applies every outcome queued so far without waiting. Returns how many
    /// were handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(outcome) = self.rx.try_recv() {
            self.deliver(outcome);
            handled += 1;
        }
        handled
    }

    /// Number of outcomes waiting to be applied.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Waits for the next outcome and applies it.
    pub async fn next(&mut self) -> Option<TaskId> {
        let outcome = self.rx.recv().await?;
        let id = outcome.task.id();
        self.deliver(outcome);
        Some(id)
    }

    /// Like [`UiDispatcher::next`], giving up after `timeout`.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Option<TaskId> {
        tokio::time::timeout(timeout, self.next()).await.ok().flatten()
    }

    fn deliver(&self, outcome: TaskOutcome) {
        let TaskOutcome { mut task, result } = outcome;
        let bindings = &self.shared.bindings;
        let target = task
            .target()
            .filter(|_| bindings.is_current(task.target_id(), task.id()));
        let exiting = self.shared.exit_early.load(Ordering::Acquire);
        let key = task.request().key.clone();

        match (result, target) {
            (TaskResult::Completed(loaded), Some(target)) if !exiting => {
                task.transition(TaskState::Completed);
                let fade_in = self.shared.display.read().fade_in;
                task.listener().on_loaded(Some(&target), &loaded.image);
                target.show_image(Arc::clone(&loaded.image), fade_in);
                task.listener().on_set(&target, &loaded.image);
                debug!(task = %task.id(), key = %key, source = %loaded.source, "Image applied");
            }
            (TaskResult::Failed(e), target) => {
                task.transition(TaskState::Failed);
                warn!(task = %task.id(), key = %key, error = %e, "Load failed");
                task.listener().on_error(&key, &e);
                if let Some(target) = target {
                    target.show_placeholder(self.shared.display.read().failed.clone());
                }
            }
            (_, target) => {
                task.transition(TaskState::Cancelled);
                trace!(task = %task.id(), key = %key, "Dropped stale result");
                task.listener().on_cancelled(target.as_ref(), &key);
            }
        }

        bindings.release(task.target_id(), task.id());
    }
}
