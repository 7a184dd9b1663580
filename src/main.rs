//! Media Gateway - provider-agnostic upload service
//!
//! Accepts multipart uploads and stores them in S3 or Cloudinary.

use clap::Parser;
use media_gateway::logging::{self, LogFormat};
use media_gateway::{config::Config, server::Server};
use std::path::PathBuf;
use tracing::info;

/// Media Gateway - upload files to S3 or Cloudinary over HTTP
#[derive(Parser, Debug)]
#[command(name = "media-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; the environment is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level.to_lowercase(), args.log_format)?;

    info!("Starting Media Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config {
        Some(ref path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            config
        }
    };

    let server = Server::from_config(config).await?;
    server.run().await?;

    Ok(())
}
