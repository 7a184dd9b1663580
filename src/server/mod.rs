//! HTTP server module
//!
//! The server is built on `hyper` and `tokio`:
//! - HTTP/1.1, one task per connection
//! - Shared read-only state ([`AppState`]) behind an `Arc`
//! - Graceful shutdown on a caller-provided future
//!
//! # Example
//!
//! ```no_run
//! use media_gateway::{config::Config, server::Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let server = Server::from_config(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod multipart;

use crate::config::Config;
use crate::router::RequestRouter;
use crate::storage::{self, StorageError};
use crate::upload::UploadGateway;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// How long in-flight connections get to finish after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every connection
pub struct AppState {
    pub gateway: UploadGateway,
    pub router: RequestRouter,
    pub config: Config,
}

/// HTTP Server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
}

impl Server {
    /// Bind the configured address and serve `gateway`.
    ///
    /// Port 0 binds an OS-assigned port; see [`Server::local_addr`].
    pub async fn bind(config: Config, gateway: UploadGateway) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        let router = RequestRouter::new(&config.server, &config.metrics);
        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(AppState {
                gateway,
                router,
                config,
            }),
        })
    }

    /// Build the configured storage backend and bind
    pub async fn from_config(config: Config) -> Result<Self, ServerError> {
        let backend = storage::from_config(&config.storage).await?;
        let gateway = UploadGateway::new(backend, &config.upload);
        Self::bind(config, gateway).await
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then drain open connections
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!(
            address = %self.local_addr,
            provider = self.state.gateway.backend().provider(),
            prefix = %self.state.config.server.path_prefix,
            "Starting server"
        );

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let state = Arc::clone(&self.state);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handlers::handle_request(req, state).await }
                    });

                    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn);

                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("Error serving connection from {}: {}", peer_addr, e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(self.listener);

        tokio::select! {
            _ = graceful.shutdown() => info!("All connections closed"),
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                warn!("Timed out waiting for connections to close");
            }
        }

        Ok(())
    }
}
