//! Presentation layer with the widgets images are bound to.

/// Reusable widgets.
pub mod widgets;

pub use widgets::{ImageSlot, SlotContent};
