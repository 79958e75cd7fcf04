//! Eligibility and header rules shared by the interceptor and the filter.

use crate::fingerprint::canonical_url;
use crate::policy::CachePolicy;
use axum::http::{header, request, HeaderMap, HeaderValue, Method, StatusCode};

/// Response header naming the backend that served a cache hit.
pub const CACHING_MECHANISM: &str = "x-caching-mechanism";

/// Only successful GETs take part in any caching.
pub fn is_cacheable(method: &Method, status: StatusCode) -> bool {
    method == Method::GET && status == StatusCode::OK
}

/// What the caching layers need to remember about a request once it has been
/// handed to the next service.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub method: Method,
    /// Canonical URL, the fingerprint input.
    pub url: String,
    conditional: HeaderMap,
}

impl RequestFacts {
    pub fn from_parts(parts: &request::Parts) -> Self {
        let mut conditional = HeaderMap::new();
        for value in parts.headers.get_all(header::IF_NONE_MATCH) {
            conditional.append(header::IF_NONE_MATCH, value.clone());
        }
        Self {
            method: parts.method.clone(),
            url: canonical_url(parts),
            conditional,
        }
    }

    /// Whether the client already holds the response identified by `fingerprint`.
    pub fn client_has(&self, fingerprint: &str) -> bool {
        if_none_match(&self.conditional, fingerprint)
    }
}

/// Set `ETag` and, unless suppressed, `Cache-Control` on a response.
///
/// `Cache-Control` is left alone when the response already forbids caching
/// (`no-cache` / `no-store`) or when the policy keeps the response
/// server-side only.
pub fn apply_client_headers(headers: &mut HeaderMap, fingerprint: &str, policy: &CachePolicy) {
    match HeaderValue::from_str(fingerprint) {
        Ok(value) => {
            headers.insert(header::ETAG, value);
        }
        Err(_) => {
            tracing::warn!(fingerprint, "fingerprint is not a valid header value");
            return;
        }
    }

    if !policy.uses_client() || forbids_caching(headers) {
        return;
    }

    let max_age = policy.client_side_duration;
    let value = format!("public, max-age={max_age}, s-maxage={max_age}");
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

fn forbids_caching(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| parse_cache_control(v).forbids_caching())
}

/// The directives of a `Cache-Control` header that forbid reuse.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
}

impl CacheControl {
    pub fn forbids_caching(&self) -> bool {
        self.no_cache || self.no_store
    }
}

/// Parse the directives of one `Cache-Control` header value.
pub fn parse_cache_control(value: &str) -> CacheControl {
    let mut result = CacheControl::default();

    for directive in value.split(',').map(|s| s.trim().to_ascii_lowercase()) {
        // `no-cache="field"` still revalidates, treat it like plain no-cache
        let name = directive.split('=').next().unwrap_or("").trim();
        match name {
            "no-cache" => result.no_cache = true,
            "no-store" => result.no_store = true,
            _ => {}
        }
    }

    result
}

/// Whether the client's `If-None-Match` header covers `fingerprint`.
///
/// Accepts a comma-separated list of tags, quoted or not, strong or weak
/// (`W/`), and `*`. An absent or unparsable header never matches.
pub fn if_none_match(request_headers: &HeaderMap, fingerprint: &str) -> bool {
    request_headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|tag| tag_matches(tag, fingerprint))
}

fn tag_matches(tag: &str, fingerprint: &str) -> bool {
    let tag = tag.trim();
    if tag == "*" {
        return true;
    }
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    let tag = tag
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag);
    !tag.is_empty() && tag == fingerprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CacheLocation;

    fn request_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn eligibility() {
        assert!(is_cacheable(&Method::GET, StatusCode::OK));
        assert!(!is_cacheable(&Method::POST, StatusCode::OK));
        assert!(!is_cacheable(&Method::HEAD, StatusCode::OK));
        assert!(!is_cacheable(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(!is_cacheable(&Method::GET, StatusCode::FOUND));
        assert!(!is_cacheable(&Method::GET, StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn sets_etag_and_public_cache_control() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ETAG, HeaderValue::from_static("stale"));
        apply_client_headers(&mut headers, "abc123", &CachePolicy::shared());

        assert_eq!(headers[header::ETAG], "abc123");
        assert_eq!(headers.get_all(header::ETAG).iter().count(), 1);
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "public, max-age=60, s-maxage=60"
        );
    }

    #[test]
    fn respects_existing_no_store() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        apply_client_headers(&mut headers, "abc", &CachePolicy::shared());

        assert_eq!(headers[header::ETAG], "abc");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    }

    #[test]
    fn server_only_leaves_cache_control_alone() {
        let policy = CachePolicy::local().with_location(CacheLocation::ServerOnly);
        let mut headers = HeaderMap::new();
        apply_client_headers(&mut headers, "abc", &policy);

        assert_eq!(headers[header::ETAG], "abc");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
    }

    #[test]
    fn parses_directives() {
        let cc = parse_cache_control("Public, max-age=120, s-maxage=60");
        assert_eq!(cc, CacheControl::default());
        assert!(!cc.forbids_caching());

        assert!(parse_cache_control("private, no-cache=\"set-cookie\"").no_cache);
        assert!(parse_cache_control("NO-STORE").no_store);
    }

    #[test]
    fn if_none_match_forms() {
        assert!(if_none_match(&request_with("abc"), "abc"));
        assert!(if_none_match(&request_with("\"abc\""), "abc"));
        assert!(if_none_match(&request_with("W/\"abc\""), "abc"));
        assert!(if_none_match(&request_with("\"x\", \"abc\""), "abc"));
        assert!(if_none_match(&request_with("*"), "abc"));
    }

    #[test]
    fn request_facts_keep_only_what_is_needed() {
        let (parts, _) = axum::http::Request::get("/items?x=1")
            .header(header::HOST, "example.com")
            .header(header::IF_NONE_MATCH, "\"abc\"")
            .header(header::ACCEPT, "application/json")
            .body(())
            .unwrap()
            .into_parts();

        let facts = RequestFacts::from_parts(&parts);
        assert_eq!(facts.method, Method::GET);
        assert_eq!(facts.url, "http://example.com/items?x=1");
        assert!(facts.client_has("abc"));
        assert!(!facts.client_has("def"));
        assert_eq!(facts.conditional.len(), 1);
    }

    #[test]
    fn if_none_match_mismatch() {
        assert!(!if_none_match(&HeaderMap::new(), "abc"));
        assert!(!if_none_match(&request_with("abcd"), "abc"));
        assert!(!if_none_match(&request_with("\"\""), "abc"));
        assert!(!if_none_match(&request_with(",,,"), "abc"));
    }
}
