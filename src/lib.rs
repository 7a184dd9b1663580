//! Media Gateway Library
//!
//! Provider-agnostic media upload gateway. Files are validated, given a
//! unique key and handed to one storage backend chosen at startup.
//!
//! # Features
//!
//! - **Validation**: size and MIME-type policy before any network call
//! - **Unique Keys**: `<category>/<millis>-<token>-<filename>`
//! - **Backends**: S3 (`aws-sdk-s3`), Cloudinary (REST), in-memory for development
//! - **Capabilities**: unsupported operations fail fast instead of no-op
//! - **Batches**: bounded concurrent uploads, all-or-nothing responses
//!
//! # Example
//!
//! ```no_run
//! use media_gateway::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::from_config(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod server;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use storage::{StorageBackend, StorageError};
pub use upload::{UploadError, UploadGateway};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
