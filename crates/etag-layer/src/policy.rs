use serde::Deserialize;
use std::time::Duration;

/// Which server-side backend holds an endpoint's cached bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Shared,
    Local,
    None,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Shared => "shared",
            CacheType::Local => "local",
            CacheType::None => "none",
        }
    }
}

/// Where a response may be cached.
///
/// - `Any`: server-side body cache plus client/proxy freshness headers.
/// - `ClientOnly`: ETag and freshness headers only, nothing stored server-side.
/// - `ServerOnly`: server-side body cache and ETag, `Cache-Control` left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLocation {
    Any,
    ClientOnly,
    ServerOnly,
}

/// Per-endpoint caching policy. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CachePolicy {
    pub cache_type: CacheType,
    pub location: CacheLocation,
    /// `max-age` / `s-maxage` sent to clients, in seconds.
    #[serde(default = "default_client_side_duration")]
    pub client_side_duration: u64,
    /// Lifetime of server-side entries, in seconds.
    #[serde(default = "default_server_side_duration")]
    pub server_side_duration: u64,
}

impl CachePolicy {
    /// Bodies cached in the shared backend, headers for clients and proxies.
    pub fn shared() -> Self {
        Self::new(CacheType::Shared, CacheLocation::Any)
    }

    /// Bodies cached in process memory, headers for clients and proxies.
    pub fn local() -> Self {
        Self::new(CacheType::Local, CacheLocation::Any)
    }

    /// ETag and freshness headers only.
    pub fn client_only() -> Self {
        Self::new(CacheType::None, CacheLocation::ClientOnly)
    }

    pub fn new(cache_type: CacheType, location: CacheLocation) -> Self {
        Self {
            cache_type,
            location,
            client_side_duration: default_client_side_duration(),
            server_side_duration: default_server_side_duration(),
        }
    }

    pub fn with_location(mut self, location: CacheLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_client_side_duration(mut self, secs: u64) -> Self {
        self.client_side_duration = secs;
        self
    }

    pub fn with_server_side_duration(mut self, secs: u64) -> Self {
        self.server_side_duration = secs;
        self
    }

    /// Whether bodies are looked up and stored server-side.
    pub fn uses_server(&self) -> bool {
        self.location != CacheLocation::ClientOnly
    }

    /// Whether `Cache-Control` may be written.
    pub fn uses_client(&self) -> bool {
        self.location != CacheLocation::ServerOnly
    }

    pub fn server_ttl(&self) -> Duration {
        Duration::from_secs(self.server_side_duration)
    }
}

fn default_client_side_duration() -> u64 {
    60
}
fn default_server_side_duration() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_defaults() {
        let shared = CachePolicy::shared();
        assert_eq!(shared.cache_type, CacheType::Shared);
        assert_eq!(shared.location, CacheLocation::Any);
        assert_eq!(shared.client_side_duration, 60);
        assert_eq!(shared.server_side_duration, 30);

        let client = CachePolicy::client_only();
        assert_eq!(client.cache_type, CacheType::None);
        assert!(!client.uses_server());
        assert!(client.uses_client());
    }

    #[test]
    fn server_only_suppresses_client_headers() {
        let policy = CachePolicy::local().with_location(CacheLocation::ServerOnly);
        assert!(policy.uses_server());
        assert!(!policy.uses_client());
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: CachePolicy =
            toml::from_str("cache_type = \"local\"\nlocation = \"server_only\"\n").unwrap();
        assert_eq!(
            policy,
            CachePolicy::local()
                .with_location(CacheLocation::ServerOnly)
                .with_client_side_duration(60)
        );
        assert_eq!(policy.server_ttl(), Duration::from_secs(30));
    }
}
