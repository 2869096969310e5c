//! Host-to-upstream routing
//!
//! Every mirror hostname is a fixed prefix joined to the configured domain;
//! the table is rebuilt from the configuration for each lookup.

use crate::config::GatewayConfig;

/// Subdomain prefix of the Docker Hub mirror
pub const DOCKER_HUB_PREFIX: &str = "docker";

/// Subdomain prefixes of the other mirrors and the registries they front
pub const MIRROR_PREFIXES: &[(&str, &str)] = &[
    ("quay", "https://quay.io"),
    ("gcr", "https://gcr.io"),
    ("k8s-gcr", "https://k8s.gcr.io"),
    ("k8s", "https://registry.k8s.io"),
    ("ghcr", "https://ghcr.io"),
    ("cloudsmith", "https://docker.cloudsmith.io"),
    ("ecr", "https://public.ecr.aws"),
];

/// A single mirror hostname and its upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Mirror hostname, e.g. `docker.example.com`
    pub host: String,

    /// Upstream registry base URL
    pub upstream: String,
}

/// Outcome of resolving a request hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The hostname is a configured mirror
    Mirror(String),

    /// Debug mode passthrough for an unknown hostname
    Passthrough(String),

    /// No upstream for this hostname
    NotFound,
}

impl Resolution {
    /// Upstream base URL, if any
    pub fn upstream(&self) -> Option<&str> {
        match self {
            Resolution::Mirror(u) | Resolution::Passthrough(u) => Some(u),
            Resolution::NotFound => None,
        }
    }
}

/// Route table for one domain suffix
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table for `domain`, using `docker_hub` for the `docker.` mirror
    pub fn new(domain: &str, docker_hub: &str) -> Self {
        let hub = std::iter::once((DOCKER_HUB_PREFIX, docker_hub.to_string()));
        let routes = hub
            .chain(
                MIRROR_PREFIXES
                    .iter()
                    .map(|(prefix, upstream)| (*prefix, upstream.to_string())),
            )
            .map(|(prefix, upstream)| Route {
                host: format!("{}.{}", prefix, domain).to_lowercase(),
                upstream,
            })
            .collect();
        Self { routes }
    }

    /// Build the table described by the gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(&config.custom_domain, &config.docker_hub_upstream)
    }

    /// All routes in table order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Exact lookup of a mirror hostname
    pub fn get(&self, host: &str) -> Option<&str> {
        let host = normalize_host(host);
        self.routes
            .iter()
            .find(|r| r.host == host)
            .map(|r| r.upstream.as_str())
    }
}

/// Resolve a request hostname against the configured mirrors
///
/// Unknown hostnames resolve to the debug upstream in debug mode and to
/// [`Resolution::NotFound`] otherwise.
pub fn resolve(host: &str, config: &GatewayConfig) -> Resolution {
    let table = RouteTable::from_config(config);
    if let Some(upstream) = table.get(host) {
        return Resolution::Mirror(upstream.to_string());
    }
    if config.is_debug() {
        return Resolution::Passthrough(config.debug_upstream().to_string());
    }
    Resolution::NotFound
}

/// Lower-case a Host header value and drop any port
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop what follows them
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    };
    without_port.to_lowercase()
}
