use axum::http::Uri;

const CONTENT_TYPE_SUFFIX: &str = "_contentType";
const FINGERPRINT_SUFFIX: &str = "_ETag";

/// Flat key layout for one logical cache entry.
///
/// The entry is three values: the body under the base key (`path?query`),
/// the content type and the fingerprint under suffixed sibling keys, so a
/// plain byte-string store can hold it. Method, headers and request body do
/// not participate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    base: String,
}

impl CacheKey {
    pub fn from_uri(uri: &Uri) -> Self {
        let mut base = uri.path().to_owned();
        if let Some(query) = uri.query() {
            base.push('?');
            base.push_str(query);
        }
        Self { base }
    }

    pub fn body(&self) -> &str {
        &self.base
    }

    pub fn content_type(&self) -> String {
        format!("{}{CONTENT_TYPE_SUFFIX}", self.base)
    }

    pub fn fingerprint(&self) -> String {
        format!("{}{FINGERPRINT_SUFFIX}", self.base)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_and_query() {
        let key = CacheKey::from_uri(&"/items?x=1".parse().unwrap());
        assert_eq!(key.body(), "/items?x=1");
        assert_eq!(key.content_type(), "/items?x=1_contentType");
        assert_eq!(key.fingerprint(), "/items?x=1_ETag");
    }

    #[test]
    fn ignores_scheme_and_host() {
        let absolute = CacheKey::from_uri(&"http://example.com/items".parse().unwrap());
        let origin = CacheKey::from_uri(&"/items".parse().unwrap());
        assert_eq!(absolute, origin);
    }

    #[test]
    fn query_distinguishes_entries() {
        let a = CacheKey::from_uri(&"/items?x=1".parse().unwrap());
        let b = CacheKey::from_uri(&"/items?x=2".parse().unwrap());
        assert_ne!(a, b);
    }
}
