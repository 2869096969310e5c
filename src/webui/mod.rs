//! Status page served to browsers at `/`
//!
//! A single self-contained HTML page: active routes, the configured domain,
//! a pull example and the daemon.json snippet for `registry-mirrors`.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::config::GatewayConfig;
use crate::registry::routes::{RouteTable, DOCKER_HUB_PREFIX};

/// Content type of the status page
pub const HTML_CONTENT_TYPE: &str = "text/html;charset=UTF-8";

const BROWSER_MARKERS: &[&str] = &["Mozilla", "Chrome", "Safari"];

const STYLE: &str = r#"body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 40px auto; padding: 0 20px; background: #f4f7f9; }
    .card { background: white; padding: 25px; border-radius: 12px; box-shadow: 0 4px 6px rgba(0,0,0,0.05); }
    h1 { color: #0969da; border-bottom: 2px solid #eaecef; padding-bottom: 10px; }
    .status { display: inline-block; background: #2da44e; color: white; padding: 2px 10px; border-radius: 20px; font-size: 14px; }
    pre { background: #f6f8fa; padding: 15px; border-radius: 6px; overflow-x: auto; border: 1px solid #d0d7de; }
    ul { list-style: none; padding: 0; }
    li { padding: 8px 0; border-bottom: 1px solid #f0f0f0; display: flex; justify-content: space-between; }
    .host { font-weight: bold; color: #0550ae; }
    footer { margin-top: 40px; font-size: 12px; color: #666; text-align: center; }"#;

/// Whether a `User-Agent` looks like a web browser
pub fn is_browser(user_agent: &str) -> bool {
    BROWSER_MARKERS.iter().any(|m| user_agent.contains(m))
}

/// Render the status page for the configured domain
pub fn render_status_page(config: &GatewayConfig) -> String {
    let domain = escape_html(&config.custom_domain);
    let table = RouteTable::from_config(config);
    let routes: String = table
        .routes()
        .iter()
        .map(|r| {
            format!(
                "<li><span class=\"host\">{}</span> &rarr; <span>{}</span></li>",
                escape_html(&r.host),
                escape_html(&r.upstream)
            )
        })
        .collect::<Vec<_>>()
        .join("\n      ");
    let rendered_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let mirror = format!("{}://{}.{}", config.public_scheme, DOCKER_HUB_PREFIX, domain);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Registry Mirror Status</title>
  <style>
    {style}
  </style>
</head>
<body>
  <div class="card">
    <h1>Registry Mirror</h1>
    <p>Status: <span class="status">Running</span></p>
    <p>Domain: <strong>{domain}</strong></p>
    <p>Checked at: <strong>{rendered_at}</strong></p>

    <h3>Quick start</h3>
    <pre>docker pull {prefix}.{domain}/library/alpine:latest</pre>

    <h3>Docker daemon configuration</h3>
    <pre>{{
  "registry-mirrors": ["{mirror}"]
}}</pre>

    <h3>Active routes</h3>
    <ul>
      {routes}
    </ul>
  </div>
  <footer>registry-mirror-gateway {version}</footer>
</body>
</html>
"#,
        style = STYLE,
        domain = domain,
        rendered_at = rendered_at,
        prefix = DOCKER_HUB_PREFIX,
        mirror = mirror,
        routes = routes,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Status page response
pub fn status_page(config: &GatewayConfig) -> Response {
    (
        [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
        render_status_page(config),
    )
        .into_response()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
