use async_trait::async_trait;
use bytes::Bytes;
use redis_protocol::error::RedisProtocolError;
use std::time::Duration;

/// Duration used when a caller stores with a zero duration.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Longest lifetime any entry gets. Longer durations are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Errors a backend can report. A missing key is never an error.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RESP protocol error: {0}")]
    Protocol(#[from] RedisProtocolError),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend replied with error: {0}")]
    Server(String),

    #[error("unexpected reply from backend: {0}")]
    Unexpected(String),
}

/// Snapshot of store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub current_size: usize,
}

/// Uniform key/value contract shared by every cache backend.
///
/// Implementations: [`LocalStore`](crate::local::LocalStore) (in-process) and
/// [`SharedStore`](crate::shared::SharedStore) (any RESP2 server).
/// Values are opaque byte strings; callers lay out composite records as
/// several keys.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up a key. `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Upsert a value. The previous value, if any, is replaced and its expiry
    /// reset. A zero `ttl` means the backend default.
    async fn store(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError>;

    /// Delete a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Short name used in logs, metrics and the diagnostic response header.
    fn name(&self) -> &'static str;
}

/// Replace a zero duration with `default` and cap the result at [`MAX_TTL`].
pub fn effective_ttl(ttl: Duration, default: Duration) -> Duration {
    let ttl = if ttl.is_zero() { default } else { ttl };
    ttl.min(MAX_TTL)
}
