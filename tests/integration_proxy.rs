//! Integration tests for Host-based routing and registry API proxying
//!
//! A wiremock server stands in for the upstream registry. Docker Hub behavior
//! is exercised by pointing `gateway.docker_hub_upstream` at the mock; other
//! registries are reached through the debug passthrough.

mod common;

use reqwest::StatusCode;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{create_test_config, create_test_state, mirror_host, run_test_server, test_client};
use registry_mirror_gateway::config::{Config, GatewayMode};
use registry_mirror_gateway::registry::CLIENT_USER_AGENT;

/// Debug-mode config sending unknown hosts to `upstream`
fn passthrough_config(upstream: &str) -> Config {
    let mut config = create_test_config("https://registry-1.docker.io");
    config.gateway.mode = GatewayMode::Debug;
    config.gateway.target_upstream = Some(upstream.to_string());
    config
}

#[tokio::test]
async fn test_unknown_host_returns_404_json() {
    let state = create_test_state(create_test_config("http://127.0.0.1:1"));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/", addr))
        .header("host", "npm.mirror.test")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"error": "Route not found", "host": "npm.mirror.test"})
    );
}

#[tokio::test]
async fn test_root_redirects_cli_clients_to_v2() {
    let state = create_test_state(create_test_config("http://127.0.0.1:1"));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/", addr))
        .header("host", mirror_host("docker"))
        .header("user-agent", "curl/8.4.0")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://docker.mirror.test/v2/"
    );
}

#[tokio::test]
async fn test_root_serves_status_page_to_browsers() {
    let state = create_test_state(create_test_config("http://127.0.0.1:1"));
    let (addr, _shutdown) = run_test_server(state).await;

    // The status page does not depend on the Host resolving
    let response = test_client()
        .get(format!("http://{}/", addr))
        .header("host", "unrelated.example")
        .header(
            "user-agent",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/html;charset=UTF-8"
    );
    let html = response.text().await.unwrap();
    assert!(html.contains("docker pull docker.mirror.test/library/alpine:latest"));
    assert!(html.contains("ghcr.mirror.test"));
}

#[tokio::test]
async fn test_docker_hub_short_name_redirects_to_library() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = create_test_state(create_test_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/alpine/manifests/latest?ns=docker.io", addr))
        .header("host", mirror_host("docker"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://docker.mirror.test/v2/library/alpine/manifests/latest?ns=docker.io"
    );
}

#[tokio::test]
async fn test_docker_hub_library_path_is_proxied() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/manifests/latest"))
        .and(header("user-agent", CLIENT_USER_AGENT))
        .and(header("accept", "application/vnd.oci.image.index.v1+json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.oci.image.index.v1+json")
                .insert_header("docker-content-digest", "sha256:1234")
                .set_body_string(r#"{"schemaVersion":2}"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(create_test_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/library/alpine/manifests/latest", addr))
        .header("host", mirror_host("docker"))
        .header("accept", "application/vnd.oci.image.index.v1+json")
        .header("user-agent", "docker/24.0.7")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("docker-content-digest").unwrap(),
        "sha256:1234"
    );
    assert_eq!(response.text().await.unwrap(), r#"{"schemaVersion":2}"#);
}

#[tokio::test]
async fn test_docker_hub_blob_redirect_is_followed_with_caller_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/blobs/sha256:abc"))
        .respond_with(ResponseTemplate::new(307).insert_header(
            "location",
            format!("{}/storage/blobs/abc?sig=xyz", mock_server.uri()),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/blobs/abc"))
        .and(query_param("sig", "xyz"))
        .and(header("authorization", "Bearer pull-token"))
        .and(header("user-agent", "docker/24.0.7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64 * 1024]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(create_test_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/library/alpine/blobs/sha256:abc", addr))
        .header("host", mirror_host("docker"))
        .header("authorization", "Bearer pull-token")
        .header("user-agent", "docker/24.0.7")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), 64 * 1024);
    assert!(body.iter().all(|b| *b == 7));
}

#[tokio::test]
async fn test_docker_hub_redirect_without_location_is_returned() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/blobs/sha256:abc"))
        .respond_with(ResponseTemplate::new(307))
        .mount(&mock_server)
        .await;

    let state = create_test_state(create_test_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/library/alpine/blobs/sha256:abc", addr))
        .header("host", mirror_host("docker"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_other_upstream_never_redirects_short_names() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/alpine/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("manifest"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(passthrough_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/alpine/manifests/latest", addr))
        .header("host", "localhost")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "manifest");
}

#[tokio::test]
async fn test_other_upstream_redirects_are_followed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/team/app/blobs/sha256:def"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", format!("{}/cdn/def", mock_server.uri())),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/def"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cdn-layer"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(passthrough_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/team/app/blobs/sha256:def", addr))
        .header("host", "localhost")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "cdn-layer");
}

#[tokio::test]
async fn test_request_body_and_method_are_forwarded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/team/app/manifests/v1"))
        .and(header(
            "content-type",
            "application/vnd.oci.image.manifest.v1+json",
        ))
        .and(body_string(r#"{"schemaVersion":2}"#))
        .respond_with(ResponseTemplate::new(201).insert_header("location", "/v2/team/app/manifests/sha256:1"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(passthrough_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .put(format!("http://{}/v2/team/app/manifests/v1", addr))
        .header("host", "localhost")
        .header("content-type", "application/vnd.oci.image.manifest.v1+json")
        .body(r#"{"schemaVersion":2}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "/v2/team/app/manifests/sha256:1"
    );
}

#[tokio::test]
async fn test_large_upload_is_streamed_through() {
    const LAYER_SIZE: usize = 8 * 1024 * 1024;

    let mock_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/team/app/blobs/uploads/42"))
        .and(query_param("digest", "sha256:feed"))
        .and(|req: &wiremock::Request| {
            req.body.len() == LAYER_SIZE && req.body.iter().all(|b| *b == 0x5a)
        })
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(passthrough_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .put(format!(
            "http://{}/v2/team/app/blobs/uploads/42?digest=sha256:feed",
            addr
        ))
        .header("host", "localhost")
        .header("content-type", "application/octet-stream")
        .body(vec![0x5a_u8; LAYER_SIZE])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_query_string_is_forwarded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/tags/list"))
        .and(query_param("n", "5"))
        .and(query_param("last", "3.18"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tags":["3.19"]}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_test_state(create_test_config(&mock_server.uri()));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!(
            "http://{}/v2/library/alpine/tags/list?n=5&last=3.18",
            addr
        ))
        .header("host", mirror_host("docker"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), r#"{"tags":["3.19"]}"#);
}

#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    // Nothing listens on port 1
    let state = create_test_state(create_test_config("http://127.0.0.1:1"));
    let (addr, _shutdown) = run_test_server(state).await;

    let response = test_client()
        .get(format!("http://{}/v2/library/alpine/manifests/latest", addr))
        .header("host", mirror_host("docker"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upstream request failed");
}
