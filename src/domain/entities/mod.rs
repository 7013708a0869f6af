//! Domain entity definitions.

mod cache_key;
mod request;

pub use cache_key::{CacheKey, KeyKind, LoadKey, Transform};
pub use request::{ImageSource, LoadRequest, LoadedImage, TargetSize, TaskState};
