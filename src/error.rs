//! Application error types for registry-mirror-gateway
//!
//! This module defines the error types used on the request path.
//! All error types use `thiserror`; [`GatewayError`] also knows how to turn
//! itself into the HTTP response the caller sees.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised while reading a registry `WWW-Authenticate` challenge
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChallengeError {
    /// Fewer than two quoted attribute values were found
    #[error("Malformed WWW-Authenticate header: {0}")]
    Malformed(String),

    /// The realm is not a usable URL
    #[error("Invalid challenge realm: {0}")]
    InvalidRealm(String),
}

/// Errors raised by outbound calls to an upstream registry
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The HTTP exchange failed
    #[error("Upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The target URL could not be built
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// The request budget elapsed before upstream answered
    #[error("Upstream request timed out")]
    Timeout,
}

/// Request-level error type
///
/// Every failure on the request path ends up here and is rendered as a JSON
/// error body. Nothing is retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The Host header does not name a mirror
    #[error("Route not found for host {host}")]
    RouteNotFound { host: String },

    /// Upstream sent a challenge the gateway cannot read
    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    /// Upstream could not be reached
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status code reported to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Challenge(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::RouteNotFound { host } => serde_json::json!({
                "error": "Route not found",
                "host": host,
            }),
            GatewayError::Challenge(e) => serde_json::json!({
                "error": "Malformed upstream challenge",
                "detail": e.to_string(),
            }),
            GatewayError::Upstream(UpstreamError::Timeout) => serde_json::json!({
                "error": "Upstream request timed out",
            }),
            GatewayError::Upstream(e) => serde_json::json!({
                "error": "Upstream request failed",
                "detail": e.to_string(),
            }),
            GatewayError::Internal(_) => serde_json::json!({
                "error": "Internal error",
            }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            self.body().to_string(),
        )
            .into_response()
    }
}
