//! Hotframe CLI - hotframe command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod config;

/// Hotframe - render QR/Code 39 symbols and hot-swap watched images
#[derive(Parser)]
#[command(name = "hotframe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a value as a QR or Code 39 PNG
    Gen {
        /// Value to encode
        value: String,

        /// Symbology (QRCode or Barcode39)
        #[arg(short, long, default_value = "qrcode")]
        symbology: String,

        /// Output PNG path
        #[arg(short, long, default_value = "symbol.png")]
        out: PathBuf,
    },
    /// Watch an image file and hot-swap numbered copies on change
    Watch {
        /// Image file to watch
        image: PathBuf,

        /// Settle delay before each copy, in milliseconds (default: 500)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Directory for the numbered copies (default: the image's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// TOML config file providing defaults for the flags above
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gen { value, symbology, out } => cmd::gen::run(&value, &symbology, &out),
        Commands::Watch { image, delay_ms, output_dir, config } => {
            cmd::watch::run(image, delay_ms, output_dir, config).await
        }
    }
}
