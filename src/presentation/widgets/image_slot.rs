//! Headless image widget.

use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;

use crate::domain::ports::{ImageTarget, TargetId};

/// What an [`ImageSlot`] currently shows.
#[derive(Clone, Default)]
pub enum SlotContent {
    /// Nothing.
    #[default]
    Empty,
    /// A loading or load-failed placeholder.
    Placeholder(Arc<DynamicImage>),
    /// A loaded image.
    Image {
        /// The pixels.
        image: Arc<DynamicImage>,
        /// Whether it was cross-faded in.
        faded: bool,
    },
}

impl std::fmt::Debug for SlotContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Placeholder(p) => write!(f, "Placeholder({}x{})", p.width(), p.height()),
            Self::Image { image, faded } => {
                write!(f, "Image({}x{}, faded: {faded})", image.width(), image.height())
            }
        }
    }
}

/// In-memory [`ImageTarget`] for hosts without a toolkit widget.
pub struct ImageSlot {
    id: TargetId,
    content: Mutex<SlotContent>,
}

impl ImageSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::next(),
            content: Mutex::new(SlotContent::Empty),
        })
    }

    /// Snapshot of what the slot shows.
    #[must_use]
    pub fn content(&self) -> SlotContent {
        self.content.lock().clone()
    }

    /// The loaded image, if any.
    #[must_use]
    pub fn image(&self) -> Option<Arc<DynamicImage>> {
        match &*self.content.lock() {
            SlotContent::Image { image, .. } => Some(Arc::clone(image)),
            _ => None,
        }
    }

    /// Returns true while a placeholder is shown.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(*self.content.lock(), SlotContent::Placeholder(_))
    }
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSlot")
            .field("id", &self.id)
            .field("content", &*self.content.lock())
            .finish()
    }
}

impl ImageTarget for ImageSlot {
    fn id(&self) -> TargetId {
        self.id
    }

    fn show_placeholder(&self, placeholder: Option<Arc<DynamicImage>>) {
        *self.content.lock() = placeholder.map_or(SlotContent::Empty, SlotContent::Placeholder);
    }

    fn show_image(&self, image: Arc<DynamicImage>, fade_in: bool) {
        *self.content.lock() = SlotContent::Image {
            image,
            faded: fade_in,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_transitions() {
        let slot = ImageSlot::new();
        assert!(matches!(slot.content(), SlotContent::Empty));

        slot.show_placeholder(Some(Arc::new(DynamicImage::new_rgba8(1, 1))));
        assert!(slot.is_placeholder());
        assert!(slot.image().is_none());

        slot.show_image(Arc::new(DynamicImage::new_rgba8(4, 2)), true);
        assert_eq!(slot.image().map(|i| i.width()), Some(4));
        assert!(matches!(slot.content(), SlotContent::Image { faded: true, .. }));

        slot.show_placeholder(None);
        assert!(matches!(slot.content(), SlotContent::Empty));
    }

    #[test]
    fn test_slots_have_distinct_ids() {
        assert_ne!(ImageSlot::new().id(), ImageSlot::new().id());
    }
}
