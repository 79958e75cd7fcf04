use crate::policy::CacheType;
use etag_store::CacheBackend;
use std::sync::Arc;

/// Backends available to cache filters, chosen once at startup.
///
/// A filter resolves its backend from here when it is built. A backend that
/// was not configured resolves to `None` and the filter runs without
/// server-side caching.
#[derive(Clone, Default)]
pub struct Backends {
    local: Option<Arc<dyn CacheBackend>>,
    shared: Option<Arc<dyn CacheBackend>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn with_shared(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.shared = Some(backend);
        self
    }

    pub fn resolve(&self, cache_type: CacheType) -> Option<Arc<dyn CacheBackend>> {
        match cache_type {
            CacheType::Local => self.local.clone(),
            CacheType::Shared => self.shared.clone(),
            CacheType::None => None,
        }
    }
}
