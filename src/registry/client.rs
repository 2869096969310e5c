//! Outbound HTTP client for upstream registries
//!
//! Two pooled `reqwest` clients are kept: one follows redirects, the other
//! hands them back to the caller so Docker Hub blob redirects can be followed
//! by hand. Every call is a single attempt, bounded by the [`Deadline`] of
//! the inbound request it serves. The deadline covers the response body too.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::{Body, Client, Method, RequestBuilder, Response, Url};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// User-Agent presented to upstream registries and token services
pub const CLIENT_USER_AGENT: &str = "Docker-Client/24.0.7 (linux)";

/// Headers that describe one hop and are never forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether redirects from upstream are followed by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Follow redirects transparently
    Follow,
    /// Return 3xx responses as-is
    Manual,
}

/// Point in time after which no upstream call of a request may continue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Deadline `budget` from now; `None` never expires
    pub fn after(budget: Option<Duration>) -> Self {
        Self(budget.map(|budget| Instant::now() + budget))
    }

    /// The instant the deadline expires, if any
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self.remaining() {
            Some(remaining) => request.timeout(remaining),
            None => request,
        }
    }
}

/// A request to replay against an upstream registry
#[derive(Debug)]
pub struct ForwardRequest {
    /// HTTP method of the original request
    pub method: Method,

    /// Absolute upstream URL
    pub url: Url,

    /// Headers of the original request
    pub headers: HeaderMap,

    /// Streamed request body, `None` for most pulls
    pub body: Option<Body>,
}

/// Client for upstream registry calls
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    follow: Client,
    manual: Client,
}

impl UpstreamClient {
    /// Create the client pair from configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let follow = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(Policy::default())
            .build()?;
        let manual = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { follow, manual })
    }

    fn client(&self, mode: RedirectMode) -> &Client {
        match mode {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
        }
    }

    /// GET `<upstream>/v2/` with the caller's headers
    pub async fn version_check(
        &self,
        upstream: &str,
        headers: &HeaderMap,
        deadline: Deadline,
    ) -> Result<Response, UpstreamError> {
        let url = join_url(upstream, "/v2/", None)?;
        let mut headers = forwardable_headers(headers);
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        debug!(url = %url, "Upstream version check");
        send(deadline.apply(self.follow.get(url).headers(headers))).await
    }

    /// Anonymous GET `<upstream>/v2/` to discover the token realm
    pub async fn probe(
        &self,
        upstream: &str,
        deadline: Deadline,
    ) -> Result<Response, UpstreamError> {
        let url = join_url(upstream, "/v2/", None)?;

        debug!(url = %url, "Probing upstream for auth challenge");
        send(deadline.apply(
            self.follow.get(url).header(USER_AGENT, CLIENT_USER_AGENT),
        ))
        .await
    }

    /// GET the token endpoint, passing the caller's credentials through
    pub async fn fetch_token(
        &self,
        token_url: Url,
        authorization: Option<&HeaderValue>,
        deadline: Deadline,
    ) -> Result<Response, UpstreamError> {
        let mut request = self
            .follow
            .get(token_url.clone())
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(auth) = authorization {
            request = request.header(AUTHORIZATION, auth.clone());
        }

        debug!(
            url = %token_url,
            authenticated = authorization.is_some(),
            "Requesting registry token"
        );
        send(deadline.apply(request)).await
    }

    /// Replay a registry API call against upstream
    pub async fn forward(
        &self,
        request: ForwardRequest,
        mode: RedirectMode,
        deadline: Deadline,
    ) -> Result<Response, UpstreamError> {
        let mut headers = forwardable_headers(&request.headers);
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if request.body.is_some() {
            if let Some(length) = request.headers.get(CONTENT_LENGTH) {
                headers.insert(CONTENT_LENGTH, length.clone());
            }
        }

        debug!(
            method = %request.method,
            url = %request.url,
            redirects = ?mode,
            "Forwarding registry request"
        );

        let mut builder = self
            .client(mode)
            .request(request.method, request.url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        send(deadline.apply(builder)).await
    }

    /// GET a blob storage location handed out by a 307, with the caller's headers
    ///
    /// A relative `location` is resolved against the URL that produced it.
    pub async fn follow_redirect(
        &self,
        from: &Url,
        location: &str,
        headers: &HeaderMap,
        deadline: Deadline,
    ) -> Result<Response, UpstreamError> {
        let url = from
            .join(location)
            .map_err(|_| UpstreamError::InvalidUrl(location.to_string()))?;

        debug!(url = %url, "Following blob redirect");
        send(deadline.apply(
            self.follow.get(url).headers(forwardable_headers(headers)),
        ))
        .await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, UpstreamError> {
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Request(e)
        }
    })
}

/// Build `<upstream><path>[?query]`
pub fn join_url(upstream: &str, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
    let mut raw = format!("{}{}", upstream.trim_end_matches('/'), path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        raw.push('?');
        raw.push_str(query);
    }
    Url::parse(&raw).map_err(|_| UpstreamError::InvalidUrl(raw))
}

/// Whether a header must not cross the gateway
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copy of `headers` without hop-by-hop headers, `Host` and `Content-Length`
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name == reqwest::header::HOST
            || name == reqwest::header::CONTENT_LENGTH
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
