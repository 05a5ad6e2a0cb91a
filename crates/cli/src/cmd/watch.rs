//! Watch an image and hot-swap numbered copies until Ctrl-C

use crate::config::FileConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use watch::{ImageWatch, SharedImageRef, WatchConfig};

pub async fn run(
    image: PathBuf,
    delay_ms: Option<u64>,
    output_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let file_config = match config_path {
        Some(path) => FileConfig::load(&path)?,
        None => FileConfig::default(),
    };

    // Flags override the config file, which overrides built-in defaults
    let defaults = WatchConfig::default();
    let config = WatchConfig {
        image_path: Some(image.clone()),
        output_dir: output_dir.or(file_config.output_dir),
        settle_ms: delay_ms
            .or(file_config.delay_ms)
            .unwrap_or(defaults.settle_ms),
    };

    let image_ref = Arc::new(SharedImageRef::new(&image));
    let watch =
        ImageWatch::open(config, image_ref.clone()).context("failed to open watch session")?;

    println!("Watching {} (Ctrl-C to stop)", image.display());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    watch.close().await;
    println!("Watch session closed");
    Ok(())
}
