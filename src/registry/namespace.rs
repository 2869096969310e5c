//! Docker Hub `library/` namespace handling
//!
//! Official Docker Hub images live under `library/<name>`, but clients address
//! them by the short name. These helpers restore the namespace in token scopes
//! and in registry API paths. Callers apply them only when the upstream is
//! Docker Hub.

/// Namespace Docker Hub uses for official images
pub const OFFICIAL_NAMESPACE: &str = "library";

/// Add the `library/` prefix to an unqualified image name
pub fn normalize_image_name(name: &str) -> String {
    if !name.contains('/') {
        format!("{}/{}", OFFICIAL_NAMESPACE, name)
    } else {
        name.to_string()
    }
}

/// Rewrite a token scope such as `repository:alpine:pull` to
/// `repository:library/alpine:pull`.
///
/// Scopes that do not have exactly three `:`-separated parts, or whose
/// repository is already namespaced, are returned unchanged.
pub fn normalize_scope(scope: &str) -> String {
    let parts: Vec<&str> = scope.split(':').collect();
    if parts.len() == 3 && !parts[1].contains('/') {
        format!(
            "{}:{}:{}",
            parts[0],
            normalize_image_name(parts[1]),
            parts[2]
        )
    } else {
        scope.to_string()
    }
}

/// Corrected path for a short-name request, if one is needed
///
/// `/v2/alpine/manifests/latest` becomes `/v2/library/alpine/manifests/latest`.
/// Only paths with exactly five `/`-separated segments whose third segment is
/// not `library` are rewritten; everything else yields `None`.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.len() == 5 && segments[2] != OFFICIAL_NAMESPACE {
        segments.insert(2, OFFICIAL_NAMESPACE);
        Some(segments.join("/"))
    } else {
        None
    }
}
