//! Upstream registry support
//!
//! Everything the gateway needs to know about the registries it mirrors:
//! - Host-to-upstream routing (`routes`)
//! - `WWW-Authenticate` challenge parsing and token URLs (`challenge`)
//! - Docker Hub `library/` namespace normalization (`namespace`)
//! - The outbound HTTP client (`client`)

pub mod challenge;
pub mod client;
pub mod namespace;
pub mod routes;

pub use challenge::AuthChallenge;
pub use client::{Deadline, ForwardRequest, RedirectMode, UpstreamClient, CLIENT_USER_AGENT};
pub use namespace::{normalize_path, normalize_scope};
pub use routes::{resolve, Resolution, Route, RouteTable};
