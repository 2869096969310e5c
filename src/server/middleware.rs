//! HTTP middleware for registry-mirror-gateway
//!
//! - Request/response logging
//! - A tracing span per request, exported through OpenTelemetry when enabled
//!
//! Both record the Host header since it selects the upstream.

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

fn host_of(request: &Request) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Log method, host, path, status and duration of every request
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let host = host_of(&request);

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        host = %host,
        path = %uri.path(),
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Wrap the whole request in an `http_request` span
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let span = tracing::info_span!(
        "http_request",
        http.method = %request.method(),
        http.host = %host_of(&request),
        http.url = %request.uri(),
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
