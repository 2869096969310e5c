//! registry-mirror-gateway - A Host-routed mirror gateway for container registries
//!
//! Requests for `docker.<domain>`, `ghcr.<domain>` and the other mirror
//! hostnames are proxied to the matching upstream registry, including the
//! registry token handshake and Docker Hub's `library/` namespace rules.

pub mod config;
pub mod error;
pub mod otel;
pub mod registry;
pub mod server;
pub mod webui;
