//! `WWW-Authenticate` challenge parsing
//!
//! Registries answer an anonymous `/v2/` probe with a Bearer challenge such as
//! `Bearer realm="https://auth.docker.io/token",service="registry.docker.io"`.
//! Attributes are read by name; a `realm` or `service` that is not named
//! takes the first quoted value not already claimed by name.

use url::Url;

use crate::error::ChallengeError;

/// Token endpoint advertised by an upstream registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Token endpoint URL
    pub realm: String,

    /// Service name to request a token for
    pub service: String,
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` header value
    ///
    /// Fails with [`ChallengeError::Malformed`] when the header carries fewer
    /// than two quoted values or yields an empty realm.
    pub fn parse(header: &str) -> Result<Self, ChallengeError> {
        let params = quoted_params(header);
        if params.len() < 2 {
            return Err(ChallengeError::Malformed(header.to_string()));
        }

        let named = |key: &str| params.iter().position(|(k, _)| k.eq_ignore_ascii_case(key));
        let (realm_at, service_at) = (named("realm"), named("service"));

        // A missing key takes the next value not claimed by name
        let mut unclaimed =
            (0..params.len()).filter(move |i| Some(*i) != realm_at && Some(*i) != service_at);
        let realm_at = realm_at.or_else(|| unclaimed.next());
        let service_at = service_at.or_else(|| unclaimed.next());

        let (Some(realm_at), Some(service_at)) = (realm_at, service_at) else {
            return Err(ChallengeError::Malformed(header.to_string()));
        };
        let realm = params[realm_at].1.clone();
        let service = params[service_at].1.clone();

        if realm.is_empty() {
            return Err(ChallengeError::Malformed(header.to_string()));
        }

        Ok(Self { realm, service })
    }

    /// Token request URL: the realm with `service` and `scope` set
    ///
    /// `service` is only set when non-empty. Either parameter replaces a
    /// same-named one already present in the realm.
    pub fn token_url(&self, scope: Option<&str>) -> Result<Url, ChallengeError> {
        let mut url =
            Url::parse(&self.realm).map_err(|_| ChallengeError::InvalidRealm(self.realm.clone()))?;

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| *k != "service" && *k != "scope")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !self.service.is_empty() {
            pairs.push(("service".to_string(), self.service.clone()));
        }
        if let Some(scope) = scope {
            pairs.push(("scope".to_string(), scope.to_string()));
        }

        url.set_query(None);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}

/// Collect `key="value"` pairs in header order, unescaping `\"` and `\\`.
///
/// Unquoted values are skipped.
fn quoted_params(header: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = header.char_indices().peekable();
    let mut key_start = 0;

    while let Some((i, c)) = chars.next() {
        match c {
            '=' if chars.peek().map(|(_, n)| *n) == Some('"') => {
                let key = last_token(&header[key_start..i]).to_string();
                chars.next();

                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    break;
                }
                params.push((key, value));
                key_start = chars.peek().map(|(j, _)| *j).unwrap_or(header.len());
            }
            ',' | ' ' => key_start = i + 1,
            _ => {}
        }
    }

    params
}

/// The word immediately before `=`, skipping the auth scheme
fn last_token(s: &str) -> &str {
    s.rsplit(|c: char| c == ' ' || c == ',')
        .next()
        .unwrap_or("")
        .trim()
}
