//! Application configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::args::CliArgs;
use super::cache_config::CacheConfig;

const APP_NAME: &str = "bitmap-loader";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for [`AppConfig`].
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Worker and pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Default decode width.
    #[serde(default = "default_target_size")]
    pub target_width: u32,

    /// Default decode height.
    #[serde(default = "default_target_size")]
    pub target_height: u32,

    /// Default corner ratio; 0 or 1 disables rounding.
    #[serde(default)]
    pub corner_ratio: u32,

    /// Binding tasks allowed to run at once.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Connect timeout for downloads, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Cross-fade from the placeholder when an image arrives.
    #[serde(default = "default_true")]
    pub fade_in: bool,

    /// Allocation ceiling for a single decode or transform, in bytes.
    #[serde(default = "default_max_decode_bytes")]
    pub max_decode_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_size(),
            target_height: default_target_size(),
            corner_ratio: 0,
            max_concurrent_tasks: default_max_concurrent_tasks(),
            connect_timeout_secs: default_connect_timeout(),
            fade_in: true,
            max_decode_bytes: default_max_decode_bytes(),
        }
    }
}

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Worker settings.
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl AppConfig {
    /// Loads the configuration from `path_override` or the default location.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn load(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path_override
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path)
        else {
            return Ok(Self::default());
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.cache_path = Some(cache_dir.clone());
        }
        if let Some(format) = args.compress_format {
            self.cache.compress_format = format;
        }
        if let Some(timeout) = args.connect_timeout {
            self.loader.connect_timeout_secs = timeout;
        }
        if args.no_disk_cache {
            self.cache.disk_cache_enabled = false;
        }
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("bitmap-loader.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

const fn default_target_size() -> u32 {
    256
}

const fn default_max_concurrent_tasks() -> usize {
    4
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_max_decode_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::CompressFormat;
    use clap::Parser;

    #[test]
    fn test_parse_config_sections() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            mem_cache_size = 1048576
            clear_disk_cache_on_start = true

            [loader]
            target_width = 120
            target_height = 90
            corner_ratio = 2
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.mem_cache_size, 1_048_576);
        assert!(config.cache.clear_disk_cache_on_start);
        assert_eq!(config.loader.target_width, 120);
        assert_eq!(config.loader.corner_ratio, 2);
        assert_eq!(config.loader.connect_timeout_secs, 10);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.loader.max_concurrent_tasks, 4);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loader]\nfade_in = false\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(!config.loader.fade_in);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loader\n").unwrap();

        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::TomlDe(_))
        ));
    }

    #[test]
    fn test_merge_with_args() {
        let args = CliArgs::parse_from([
            "bitmap-loader",
            "--log-level",
            "trace",
            "--compress-format",
            "webp",
            "--no-disk-cache",
            "clear",
        ]);
        let mut config = AppConfig::default();
        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.cache.compress_format, CompressFormat::Webp);
        assert!(!config.cache.disk_cache_enabled);
    }
}
