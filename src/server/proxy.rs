//! Request dispatcher
//!
//! Each request is resolved by Host header to an upstream registry and then
//! classified by path:
//! - `/` serves the status page to browsers and redirects everything else to `/v2/`
//! - `/v2/` is the version check
//! - `/v2/auth` probes upstream for its challenge and performs the token exchange
//! - anything else is forwarded, with Docker Hub short names redirected to
//!   their `library/` path and Docker Hub blob redirects followed once
//!
//! An upstream 401 is never passed through. The caller gets a challenge that
//! points back at this gateway's own `/v2/auth`.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method, StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{GatewayError, UpstreamError};
use crate::registry::client::{is_hop_by_hop, join_url};
use crate::registry::namespace::{normalize_path, normalize_scope};
use crate::registry::routes::{normalize_host, resolve};
use crate::registry::{AuthChallenge, Deadline, ForwardRequest, RedirectMode};
use crate::webui;

use super::router::AppState;

/// Metric label for requests that did not resolve to an upstream
const NO_UPSTREAM: &str = "none";

/// A resolved inbound request
struct ProxyRequest {
    /// Upstream registry base URL
    upstream: String,

    /// Whether the upstream is Docker Hub
    is_docker_hub: bool,

    /// Host header as sent by the caller, port included
    host: String,

    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,

    /// Bounds every upstream call made for this request
    deadline: Deadline,
}

/// Fallback handler for every request
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let host = header_str(&parts.headers, header::HOST).to_string();
    let gateway = &state.config.gateway;

    if parts.uri.path() == "/" {
        let user_agent = header_str(&parts.headers, header::USER_AGENT);
        if webui::is_browser(user_agent) {
            return webui::status_page(gateway);
        }
        return moved_permanently(&gateway.public_scheme, &host, "/v2/", None);
    }

    let resolution = resolve(&host, gateway);
    let Some(upstream) = resolution.upstream().map(str::to_string) else {
        info!(host = %host, path = %parts.uri.path(), "No route for host");
        state.metrics.record_request(NO_UPSTREAM, "not_found");
        return GatewayError::RouteNotFound {
            host: normalize_host(&host),
        }
        .into_response();
    };

    let request = ProxyRequest {
        is_docker_hub: upstream == gateway.docker_hub_upstream,
        upstream,
        host,
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        deadline: Deadline::after(state.config.upstream.request_timeout()),
    };
    let upstream = request.upstream.clone();

    let result = match request.deadline.instant() {
        Some(at) => tokio::time::timeout_at(at, handle(&state, request, body))
            .await
            .unwrap_or_else(|_| Err(UpstreamError::Timeout.into())),
        None => handle(&state, request, body).await,
    };
    let response = result.unwrap_or_else(|e| e.into_response());

    state
        .metrics
        .record_request(&upstream, outcome(response.status()));
    state
        .metrics
        .record_request_duration(&upstream, start.elapsed().as_secs_f64());
    response
}

async fn handle(
    state: &AppState,
    request: ProxyRequest,
    body: Body,
) -> Result<Response, GatewayError> {
    match request.path.as_str() {
        "/v2/" => return version_check(state, &request).await,
        "/v2/auth" => return token_exchange(state, &request).await,
        _ => {}
    }

    if request.is_docker_hub {
        if let Some(corrected) = normalize_path(&request.path) {
            debug!(from = %request.path, to = %corrected, "Redirecting to library namespace");
            return Ok(moved_permanently(
                &state.config.gateway.public_scheme,
                &request.host,
                &corrected,
                request.query.as_deref(),
            ));
        }
    }
    forward(state, request, body).await
}

/// `/v2/`: relay upstream's answer, re-signaling 401 as this gateway
async fn version_check(state: &AppState, request: &ProxyRequest) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let response = state
        .client
        .version_check(&request.upstream, &request.headers, request.deadline)
        .await?;
    state
        .metrics
        .record_upstream_duration(&request.upstream, started.elapsed().as_secs_f64());

    if response.status() == StatusCode::UNAUTHORIZED {
        return Ok(unauthorized(
            &state.config.gateway.public_scheme,
            &request.host,
        ));
    }
    Ok(into_response(response))
}

/// `/v2/auth`: discover the realm with an anonymous probe, then fetch a token
async fn token_exchange(
    state: &AppState,
    request: &ProxyRequest,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let probe = state
        .client
        .probe(&request.upstream, request.deadline)
        .await?;

    if probe.status() != StatusCode::UNAUTHORIZED {
        return Ok(into_response(probe));
    }
    let Some(challenge) = probe
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    else {
        return Ok(into_response(probe));
    };

    let challenge = AuthChallenge::parse(&challenge)?;
    let scope = request
        .query
        .as_deref()
        .and_then(scope_param)
        .map(|scope| {
            if request.is_docker_hub {
                normalize_scope(&scope)
            } else {
                scope
            }
        });
    let token_url = challenge.token_url(scope.as_deref())?;

    let response = state
        .client
        .fetch_token(
            token_url,
            request.headers.get(header::AUTHORIZATION),
            request.deadline,
        )
        .await?;
    state
        .metrics
        .record_token_request(&request.upstream, response.status().as_u16());
    state
        .metrics
        .record_upstream_duration(&request.upstream, started.elapsed().as_secs_f64());

    Ok(into_response(response))
}

/// Any other registry call; a request body is streamed through unbuffered
async fn forward(
    state: &AppState,
    request: ProxyRequest,
    body: Body,
) -> Result<Response, GatewayError> {
    let url = join_url(&request.upstream, &request.path, request.query.as_deref())?;
    let body = (!body.is_end_stream())
        .then(|| reqwest::Body::wrap_stream(body.into_data_stream()));
    let mode = if request.is_docker_hub {
        RedirectMode::Manual
    } else {
        RedirectMode::Follow
    };

    let started = Instant::now();
    let response = state
        .client
        .forward(
            ForwardRequest {
                method: request.method,
                url,
                headers: request.headers.clone(),
                body,
            },
            mode,
            request.deadline,
        )
        .await?;

    if response.status() == StatusCode::UNAUTHORIZED {
        return Ok(unauthorized(
            &state.config.gateway.public_scheme,
            &request.host,
        ));
    }

    if request.is_docker_hub && response.status() == StatusCode::TEMPORARY_REDIRECT {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(location) = location {
            state.metrics.record_blob_redirect(&request.upstream);
            let blob = state
                .client
                .follow_redirect(
                    response.url(),
                    &location,
                    &request.headers,
                    request.deadline,
                )
                .await?;
            state
                .metrics
                .record_upstream_duration(&request.upstream, started.elapsed().as_secs_f64());
            return Ok(into_response(blob));
        }
    }

    state
        .metrics
        .record_upstream_duration(&request.upstream, started.elapsed().as_secs_f64());
    Ok(into_response(response))
}

/// 401 whose challenge points at this gateway's `/v2/auth`
pub fn unauthorized(scheme: &str, host: &str) -> Response {
    let challenge = format!(
        "Bearer realm=\"{}://{}/v2/auth\",service=\"{}\"",
        scheme, host, host
    );
    let mut response = (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "message": "UNAUTHORIZED" }).to_string(),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Convert an upstream response, streaming its body
fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// 301 to `path` on this gateway
fn moved_permanently(scheme: &str, host: &str, path: &str, query: Option<&str>) -> Response {
    let mut location = format!("{}://{}{}", scheme, host, path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        location.push('?');
        location.push_str(query);
    }

    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(_) => GatewayError::Internal(format!("Invalid redirect location {}", location))
            .into_response(),
    }
}

/// First `scope` query parameter, if non-empty
fn scope_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "scope")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn outcome(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "success",
        300..=399 => "redirect",
        401 => "unauthorized",
        400..=499 => "client_error",
        _ => "error",
    }
}
