//! Application configuration.

pub mod app_config;
pub mod args;
pub mod cache_config;

pub use app_config::{AppConfig, ConfigError, LoaderConfig, LogLevel};
pub use args::{CliArgs, Command};
pub use cache_config::{CacheConfig, CompressFormat, default_cache_root};
