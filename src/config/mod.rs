//! Configuration management for registry-mirror-gateway
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. The resulting [`Config`] is built
//! once at start-up and shared read-only with every request handler.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Docker Hub's registry endpoint
pub const DOCKER_HUB_UPSTREAM: &str = "https://registry-1.docker.io";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Mirror routing configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Outbound client configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix MIRROR_GATEWAY_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("MIRROR_GATEWAY_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("MIRROR_GATEWAY_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        if let Ok(domain) = std::env::var("MIRROR_GATEWAY_CUSTOM_DOMAIN") {
            config.gateway.custom_domain = domain;
        }
        if let Ok(mode) = std::env::var("MIRROR_GATEWAY_MODE") {
            config.gateway.mode = mode.parse()?;
        }
        if let Ok(target) = std::env::var("MIRROR_GATEWAY_TARGET_UPSTREAM") {
            config.gateway.target_upstream = Some(target);
        }
        if let Ok(scheme) = std::env::var("MIRROR_GATEWAY_PUBLIC_SCHEME") {
            config.gateway.public_scheme = scheme;
        }

        if let Ok(secs) = std::env::var("MIRROR_GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            config.upstream.request_timeout_secs = Some(secs.parse().map_err(|_| {
                ConfigError::Parse("Invalid upstream timeout".to_string())
            })?);
        }

        if let Ok(level) = std::env::var("MIRROR_GATEWAY_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(enabled) = std::env::var("MIRROR_GATEWAY_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("MIRROR_GATEWAY_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = self.gateway.custom_domain.trim();
        if domain.is_empty() {
            return Err(ConfigError::MissingRequired(
                "gateway.custom_domain".to_string(),
            ));
        }
        if domain.contains('/') || domain.contains(':') {
            return Err(ConfigError::InvalidValue(format!(
                "gateway.custom_domain must be a bare domain, got {}",
                domain
            )));
        }
        match self.gateway.public_scheme.as_str() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "gateway.public_scheme must be http or https, got {}",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Routing mode of the gateway
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Only the fixed mirror hostnames are routed
    #[default]
    Normal,
    /// Unknown hostnames fall through to the target upstream
    Debug,
}

impl std::str::FromStr for GatewayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "normal" => Ok(GatewayMode::Normal),
            "debug" => Ok(GatewayMode::Debug),
            other => Err(ConfigError::InvalidValue(format!(
                "Unknown gateway mode: {}",
                other
            ))),
        }
    }
}

/// Mirror routing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Domain the mirror subdomains hang off (`docker.<domain>`, ...)
    #[serde(default = "default_custom_domain")]
    pub custom_domain: String,

    /// Routing mode
    #[serde(default)]
    pub mode: GatewayMode,

    /// Upstream for unknown hosts in debug mode (Docker Hub when unset)
    #[serde(default)]
    pub target_upstream: Option<String>,

    /// Scheme clients use to reach this gateway, used in redirects and challenges
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,

    /// Docker Hub registry endpoint
    #[serde(default = "default_docker_hub_upstream")]
    pub docker_hub_upstream: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            custom_domain: default_custom_domain(),
            mode: GatewayMode::default(),
            target_upstream: None,
            public_scheme: default_public_scheme(),
            docker_hub_upstream: default_docker_hub_upstream(),
        }
    }
}

impl GatewayConfig {
    /// Whether unknown hosts are passed through to the target upstream
    pub fn is_debug(&self) -> bool {
        self.mode == GatewayMode::Debug
    }

    /// Upstream used by the debug passthrough
    pub fn debug_upstream(&self) -> &str {
        self.target_upstream
            .as_deref()
            .unwrap_or(&self.docker_hub_upstream)
    }
}

fn default_custom_domain() -> String {
    "localhost".to_string()
}

fn default_public_scheme() -> String {
    "https".to_string()
}

fn default_docker_hub_upstream() -> String {
    DOCKER_HUB_UPSTREAM.to_string()
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Budget for all outbound calls of one inbound request; unset means no limit
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Per-request budget, if one is configured
    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        self.request_timeout_secs.map(std::time::Duration::from_secs)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "registry-mirror-gateway".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format, `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
