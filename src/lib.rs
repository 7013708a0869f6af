//! bitmap-loader - Asynchronous bitmap loading for widget hosts.
//!
//! This crate fetches images from the network, bundled assets or local files,
//! decodes them downsampled to a target size, optionally rounds their corners,
//! and caches them in a byte-bounded memory LRU and a size- and count-bounded
//! disk LRU. Loads are bound to widgets so only the newest request for a widget
//! is ever applied.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the pipeline and the worker facade.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, codecs and transports.
pub mod infrastructure;
/// Presentation layer containing image targets.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "bitmap-loader";
