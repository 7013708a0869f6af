//! Listener contract for load progress and outcome.

use std::sync::Arc;

use image::DynamicImage;

use super::image_target::ImageTarget;
use crate::domain::entities::LoadKey;
use crate::domain::errors::LoadError;

/// Receives the lifecycle of one load request.
///
/// Per request the order is `on_start`, any number of `on_progress_update`,
/// then exactly one of `on_loaded` (followed by `on_set` when the image reached
/// a widget), `on_error` or `on_cancelled`. Every method defaults to a no-op.
pub trait LoadListener: Send + Sync {
    /// The request was accepted. `target` is `None` for direct loads.
    fn on_start(&self, _target: Option<&Arc<dyn ImageTarget>>, _key: &LoadKey) {}

    /// Bytes were received. `total` is `None` when the length is unknown.
    /// Called from a worker thread.
    fn on_progress_update(&self, _key: &LoadKey, _total: Option<u64>, _downloaded: u64) {}

    /// The image was decoded.
    fn on_loaded(&self, _target: Option<&Arc<dyn ImageTarget>>, _image: &Arc<DynamicImage>) {}

    /// The image was pushed into the widget.
    fn on_set(&self, _target: &Arc<dyn ImageTarget>, _image: &Arc<DynamicImage>) {}

    /// The load failed.
    fn on_error(&self, _key: &LoadKey, _error: &LoadError) {}

    /// The load was superseded or abandoned.
    fn on_cancelled(&self, _target: Option<&Arc<dyn ImageTarget>>, _key: &LoadKey) {}
}

/// Listener that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleLoadListener;

impl LoadListener for SimpleLoadListener {}
