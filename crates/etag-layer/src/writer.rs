use crate::metrics;
use bytes::Bytes;
use etag_store::CacheBackend;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Runs cache writes off the request path.
///
/// Each batch is a detached task: the request never waits for it and never
/// sees its outcome. Failures and panics are logged and counted, nothing is
/// retried. [`drain`](Self::drain) waits for every outstanding batch.
#[derive(Clone)]
pub struct StoreWriter {
    tasks: TaskTracker,
}

impl Default for StoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreWriter {
    pub fn new() -> Self {
        Self {
            tasks: TaskTracker::new(),
        }
    }

    /// Write `entries` to `backend` in order, in the background.
    pub fn store(&self, backend: Arc<dyn CacheBackend>, entries: Vec<(String, Bytes)>, ttl: Duration) {
        let name = backend.name();
        let batch = async move {
            for (key, value) in entries {
                match backend.store(&key, value, ttl).await {
                    Ok(()) => metrics::record_store(name, true),
                    Err(e) => {
                        metrics::record_store(name, false);
                        tracing::warn!(backend = name, key = %key, error = %e, "background cache store failed");
                    }
                }
            }
        };

        self.tasks.spawn(async move {
            if AssertUnwindSafe(batch).catch_unwind().await.is_err() {
                metrics::record_store(name, false);
                tracing::error!(backend = name, "background cache store panicked");
            }
        });
    }

    /// Number of batches still running.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every batch spawned so far has finished.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use etag_store::{BackendError, LocalStore};

    struct Unreachable;

    #[async_trait]
    impl CacheBackend for Unreachable {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, BackendError> {
            Err(BackendError::Timeout(Duration::from_millis(1)))
        }
        async fn store(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), BackendError> {
            Err(BackendError::Timeout(Duration::from_millis(1)))
        }
        async fn remove(&self, _key: &str) -> Result<(), BackendError> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    struct Panicking;

    #[async_trait]
    impl CacheBackend for Panicking {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, BackendError> {
            Ok(None)
        }
        async fn store(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), BackendError> {
            panic!("store exploded")
        }
        async fn remove(&self, _key: &str) -> Result<(), BackendError> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn writes_in_background() {
        let store = Arc::new(LocalStore::default());
        let writer = StoreWriter::new();

        writer.store(
            store.clone(),
            vec![
                ("a".into(), Bytes::from_static(b"1")),
                ("b".into(), Bytes::from_static(b"2")),
            ],
            Duration::from_secs(30),
        );
        writer.drain().await;

        assert_eq!(store.lookup("a"), Some(Bytes::from_static(b"1")));
        assert_eq!(store.lookup("b"), Some(Bytes::from_static(b"2")));
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn failures_and_panics_stay_contained() {
        let writer = StoreWriter::new();
        writer.store(Arc::new(Unreachable), vec![("k".into(), Bytes::new())], Duration::ZERO);
        writer.store(Arc::new(Panicking), vec![("k".into(), Bytes::new())], Duration::ZERO);
        writer.drain().await;

        // Still usable afterwards.
        let store = Arc::new(LocalStore::default());
        writer.store(store.clone(), vec![("k".into(), Bytes::from_static(b"v"))], Duration::ZERO);
        writer.drain().await;
        assert!(store.contains("k"));
    }
}
