use crate::traits::{effective_ttl, BackendError, CacheBackend, StoreStats, DEFAULT_TTL, MAX_TTL};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Number of shards. Must be a power of two for fast modulo via bitmask.
const NUM_SHARDS: usize = 64;
const SHARD_MASK: u64 = (NUM_SHARDS as u64) - 1;

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process key/value store with per-entry absolute expiry.
///
/// Keys are spread over 64 shards, each behind its own `RwLock`, so
/// concurrent requests for different keys rarely contend. Reads take a read
/// lock; an expired entry found on read is reported as absent and removed
/// under a write lock. Entries nobody reads again are reclaimed by
/// [`purge_expired`](Self::purge_expired), usually driven by
/// [`spawn_sweeper`](Self::spawn_sweeper).
///
/// Shard selection uses `ahash` with fixed seeds so a key always lands on the
/// same shard.
pub struct LocalStore {
    shards: Box<[RwLock<HashMap<String, Entry>>; NUM_SHARDS]>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl LocalStore {
    /// Create an empty store. `default_ttl` applies to zero-duration stores.
    pub fn new(default_ttl: Duration) -> Self {
        let shards: Vec<RwLock<HashMap<String, Entry>>> = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        let shards: Box<[RwLock<HashMap<String, Entry>>; NUM_SHARDS]> = shards
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!());

        Self {
            shards,
            default_ttl: effective_ttl(default_ttl, DEFAULT_TTL),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(key: &str) -> usize {
        let hash = ahash::RandomState::with_seeds(1, 2, 3, 4).hash_one(key);
        (hash & SHARD_MASK) as usize
    }

    /// Look up a key, dropping it if it has expired.
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        let idx = Self::shard_index(key);
        let now = Instant::now();

        {
            let shard = self.shards[idx].read();
            match shard.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock, a concurrent insert may
        // have refreshed it in between.
        let mut shard = self.shards[idx].write();
        if let Some(entry) = shard.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            shard.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace a value. A zero `ttl` uses the store default.
    pub fn insert(&self, key: String, value: Bytes, ttl: Duration) {
        let ttl = effective_ttl(ttl, self.default_ttl);
        let idx = Self::shard_index(&key);
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now + MAX_TTL),
        };
        self.shards[idx].write().insert(key, entry);
    }

    /// Remove a key. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let idx = Self::shard_index(key);
        let removed = self.shards[idx].write().remove(key);
        matches!(removed, Some(entry) if !entry.is_expired(Instant::now()))
    }

    /// Whether a live entry exists, without touching hit/miss counters.
    pub fn contains(&self, key: &str) -> bool {
        self.ttl_remaining(key).is_some()
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let idx = Self::shard_index(key);
        let now = Instant::now();
        let shard = self.shards[idx].read();
        shard
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired(now));
            removed += before - shard.len();
        }
        self.expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Aggregate statistics across all shards.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            current_size: self.len(),
        }
    }

    /// Periodically purge expired entries until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "purged expired entries");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CacheBackend for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        Ok(self.lookup(key))
    }

    async fn store(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError> {
        self.insert(key.to_string(), value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.delete(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
