//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use registry_mirror_gateway::config::{Config, GatewayConfig, ServerConfig};
use registry_mirror_gateway::otel::Metrics;
use registry_mirror_gateway::server::AppState;

/// Domain every test configuration serves
pub const TEST_DOMAIN: &str = "mirror.test";

/// Host header for a mirror prefix, e.g. `docker` -> `docker.mirror.test`
pub fn mirror_host(prefix: &str) -> String {
    format!("{}.{}", prefix, TEST_DOMAIN)
}

/// Configuration whose Docker Hub mirror points at `docker_hub_upstream`
pub fn create_test_config(docker_hub_upstream: &str) -> Config {
    Config {
        server: create_test_server_config(),
        gateway: GatewayConfig {
            custom_domain: TEST_DOMAIN.to_string(),
            docker_hub_upstream: docker_hub_upstream.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Create a test application state
pub fn create_test_state(config: Config) -> AppState {
    AppState::new(config, Metrics::global()).expect("Failed to build upstream client")
}

/// Create a test server configuration with a random port
pub fn create_test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

/// Client that hands redirects back to the test
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build test client")
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = registry_mirror_gateway::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
