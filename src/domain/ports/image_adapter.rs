//! Port supplying keys for index-based loads.

use crate::domain::entities::LoadKey;

/// Backing data for `load_image_at`, typically the rows of a list.
#[cfg_attr(test, mockall::automock)]
pub trait ImageAdapter: Send + Sync {
    /// Returns the key at `index`, if any.
    fn item(&self, index: usize) -> Option<LoadKey>;

    /// Number of items.
    fn len(&self) -> usize;

    /// Returns true if there are no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
