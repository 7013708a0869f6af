//! Domain layer with core image-loading types and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, LoadKey, LoadRequest, TargetSize, Transform};
pub use errors::{CacheError, LoadError};
pub use ports::{ImageTarget, LoadListener};
