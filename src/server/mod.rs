//! HTTP server components for registry-mirror-gateway
//!
//! This module provides the HTTP server infrastructure including:
//! - The Host-routed request dispatcher
//! - Logging and tracing middleware
//! - Server lifecycle management

pub mod middleware;
pub mod proxy;
pub mod router;

pub use proxy::unauthorized;
pub use router::{build_router, AppState};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;

/// HTTP server for registry-mirror-gateway
///
/// Binds the configured address, applies the middleware stack and serves
/// until the shutdown future resolves.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::Config(format!("Invalid host: {}", self.config.host)))?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// Run the server until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr()?;
        let app = build_router(self.state)
            .layer(axum::middleware::from_fn(middleware::logging_middleware))
            .layer(axum::middleware::from_fn(middleware::tracing_middleware))
            .layer(tower_http::trace::TraceLayer::new_for_http());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
