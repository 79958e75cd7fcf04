//! Deterministic response fingerprints used as ETag values.

use axum::http::request::Parts;
use axum::http::{header, Uri};
use sha2::{Digest, Sha256};

/// Length of every fingerprint in characters.
pub const FINGERPRINT_LEN: usize = 64;

/// Fingerprint a response payload served under `url`.
///
/// SHA-256 over the URL, a NUL byte and the payload, rendered as lowercase
/// hex. No per-process salt: the same inputs give the same value on every
/// node and across restarts, so stored fingerprints and client-held ETags
/// stay comparable.
pub fn fingerprint(url: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// The absolute URL a request was made for: `scheme://host/path?query`.
///
/// Server-side request URIs are usually origin-form, so the host comes from
/// the `Host` header and the scheme defaults to `http`. Without any host the
/// bare path and query are used.
pub fn canonical_url(parts: &Parts) -> String {
    canonical_url_from(&parts.uri, parts.headers.get(header::HOST).and_then(|h| h.to_str().ok()))
}

pub(crate) fn canonical_url_from(uri: &Uri, host_header: Option<&str>) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let host = uri
        .authority()
        .map(|a| a.as_str())
        .or(host_header)
        .map(str::to_ascii_lowercase);

    match host {
        Some(host) => {
            let scheme = uri.scheme_str().unwrap_or("http");
            format!("{scheme}://{host}{path_and_query}")
        }
        None => path_and_query.to_string(),
    }
}
