//! Port for the widget an image is bound to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a widget, used as the binding side-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocates a process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// A screen widget that can display a decoded image.
///
/// Workers only ever hold a `Weak` reference to a target; dropping the last
/// `Arc` is how a host destroys it.
pub trait ImageTarget: Send + Sync {
    /// Returns the identity used to track the bound task.
    fn id(&self) -> TargetId;

    /// Shows the loading or load-failed placeholder. `None` clears the widget.
    fn show_placeholder(&self, placeholder: Option<Arc<DynamicImage>>);

    /// Shows the final image, optionally cross-fading from the placeholder.
    fn show_image(&self, image: Arc<DynamicImage>, fade_in: bool);
}
