use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bitmap_loader::application::ImageWorker;
use bitmap_loader::domain::entities::{LoadKey, LoadRequest, TargetSize, Transform};
use bitmap_loader::domain::ports::{AssetSource, LoadListener};
use bitmap_loader::infrastructure::{
    AppConfig, CacheService, CliArgs, Command, DirAssetSource, ReqwestTransport,
};

const ASSET_BUNDLE: &str = "cli";

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

struct ProgressLog;

impl LoadListener for ProgressLog {
    fn on_progress_update(&self, key: &LoadKey, total: Option<u64>, downloaded: u64) {
        debug!(key = %key, downloaded, total, "Download progress");
    }
}

async fn fetch(
    config: &AppConfig,
    cache: Arc<CacheService>,
    key: String,
    out: &Path,
    size: (Option<u32>, Option<u32>),
    corner: Option<u32>,
    assets: Option<&Path>,
) -> Result<()> {
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.loader.connect_timeout_secs,
    ))?);
    let assets = assets.map(|dir| {
        Arc::new(DirAssetSource::new(ASSET_BUNDLE, dir)) as Arc<dyn AssetSource>
    });
    let (worker, _dispatcher) = ImageWorker::new(&config.loader, cache, transport, assets)?;

    let size = TargetSize::new(
        size.0.unwrap_or(config.loader.target_width),
        size.1.unwrap_or(config.loader.target_height),
    )?;
    let corner = corner.unwrap_or(config.loader.corner_ratio);
    let request = LoadRequest::new(key, size).with_transform(Transform::round_corner(corner));

    let loaded = worker
        .get_image_bitmap(&request, Some(&ProgressLog))
        .await
        .wrap_err_with(|| format!("Failed to load {}", request.key))?;

    loaded
        .image
        .save_with_format(out, image::ImageFormat::Png)
        .wrap_err_with(|| format!("Failed to write {}", out.display()))?;

    println!(
        "{} -> {} ({}x{}, from {})",
        loaded.key,
        out.display(),
        loaded.image.width(),
        loaded.image.height(),
        loaded.source
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.merge_with_args(&args);

    init_logging(&config)?;

    info!(version = bitmap_loader::VERSION, "Starting {}", bitmap_loader::NAME);

    let cache = Arc::new(CacheService::open(config.cache.clone()));

    match args.command {
        Command::Fetch {
            key,
            out,
            width,
            height,
            corner,
            assets,
        } => {
            fetch(
                &config,
                cache,
                key,
                &out,
                (width, height),
                corner,
                assets.as_deref(),
            )
            .await
        }
        Command::Clear => {
            cache.clear_caches()?;
            println!(
                "Cleared caches under {}",
                config.cache.effective_cache_path().display()
            );
            Ok(())
        }
    }
}
