use super::app_config::LogLevel;
use super::cache_config::CompressFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "bitmap-loader",
    version,
    about = "Fetch, downsample and cache images",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Root cache directory.
    #[arg(long, value_name = "DIR", env = "BITMAP_LOADER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Format for re-encoded disk cache entries.
    #[arg(long, value_enum)]
    pub compress_format: Option<CompressFormat>,

    /// Download connect timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Skip the re-encoded disk tier.
    #[arg(long)]
    pub no_disk_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve one image through the caches and write it as PNG.
    Fetch {
        /// URL, `asset://name` or file path.
        key: String,

        /// Output file.
        #[arg(short, long, value_name = "PATH")]
        out: PathBuf,

        /// Target width; defaults to the configured size.
        #[arg(long)]
        width: Option<u32>,

        /// Target height; defaults to the configured size.
        #[arg(long)]
        height: Option<u32>,

        /// Corner ratio; 2 crops to a circle.
        #[arg(long)]
        corner: Option<u32>,

        /// Directory served for `asset://` keys.
        #[arg(long, value_name = "DIR")]
        assets: Option<PathBuf>,
    },
    /// Remove every cached file.
    Clear,
}
