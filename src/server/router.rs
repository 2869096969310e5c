//! HTTP router for registry-mirror-gateway
//!
//! Mirror traffic is routed by Host header rather than by path, so every
//! request goes to a single fallback handler that dispatches on the resolved
//! upstream and the path.

use axum::Router;
use std::sync::Arc;

use crate::config::Config;
use crate::error::UpstreamError;
use crate::otel::Metrics;
use crate::registry::UpstreamClient;

use super::proxy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at start-up
    pub config: Arc<Config>,

    /// Pooled clients for upstream calls
    pub client: UpstreamClient,

    /// Request metrics
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Build the state, creating the upstream clients from `config`
    pub fn new(config: Config, metrics: Metrics) -> Result<Self, UpstreamError> {
        let client = UpstreamClient::new(&config.upstream)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            metrics: Arc::new(metrics),
        })
    }
}

/// Build the main application router
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(proxy::dispatch).with_state(state)
}
