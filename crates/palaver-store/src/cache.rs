//! Write-through record cache in front of a [`StorageBackend`].

use crate::backend::{RecordKind, StorageBackend};
use moka::future::Cache;
use palaver_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache performance counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups served from memory.
    pub hits: AtomicU64,
    /// Lookups that went to the backend.
    pub misses: AtomicU64,
    /// Writes the backend rejected; the cached value was kept.
    pub write_failures: AtomicU64,
}

impl CacheMetrics {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of lookups served from memory.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Typed, cached view over one [`RecordKind`] of a backend.
///
/// Writes update the cache first and then the backend. When the backend
/// write fails the cached value stays, so the process keeps serving the
/// latest state while the error is reported to the caller.
pub struct RecordCache<V> {
    backend: Arc<dyn StorageBackend>,
    kind: RecordKind,
    cache: Cache<String, V>,
    metrics: Arc<CacheMetrics>,
}

impl<V> RecordCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` records.
    pub fn new(backend: Arc<dyn StorageBackend>, kind: RecordKind, capacity: u64) -> Self {
        Self {
            backend,
            kind,
            cache: Cache::builder().max_capacity(capacity).build(),
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// Record kind served by this cache.
    pub const fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Loads a record, from memory when possible.
    pub async fn load(&self, key: &str) -> Result<Option<V>> {
        if let Some(value) = self.cache.get(key).await {
            self.metrics.record_hit();
            return Ok(Some(value));
        }
        self.metrics.record_miss();

        let Some(bytes) = self.backend.get(self.kind, key).await? else {
            debug!(kind = %self.kind, key, "No stored record");
            return Ok(None);
        };
        let value: V = serde_json::from_slice(&bytes)?;
        self.cache.insert(key.to_string(), value.clone()).await;
        Ok(Some(value))
    }

    /// Stores a record in memory and in the backend.
    pub async fn store(&self, key: &str, value: &V) -> Result<()> {
        self.cache.insert(key.to_string(), value.clone()).await;

        let bytes = serde_json::to_vec(value)?;
        if let Err(err) = self.backend.put(self.kind, key, bytes).await {
            self.metrics.record_write_failure();
            warn!(kind = %self.kind, key, error = %err, "Backend write failed, keeping cached value");
            return Err(err);
        }
        Ok(())
    }

    /// Every record of this kind, with cached values taking precedence over
    /// stored ones.
    pub async fn list(&self) -> Result<Vec<(String, V)>> {
        let mut records = BTreeMap::new();
        for (key, bytes) in self.backend.list(self.kind).await? {
            match serde_json::from_slice::<V>(&bytes) {
                Ok(value) => {
                    records.insert(key, value);
                }
                Err(err) => {
                    warn!(kind = %self.kind, key = %key, error = %err, "Skipping unreadable record");
                }
            }
        }
        for (key, value) in self.cache.iter() {
            records.insert(key.as_ref().clone(), value);
        }
        Ok(records.into_iter().collect())
    }

    /// Flushes the backend.
    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }

    /// Counters for this cache.
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<V> std::fmt::Debug for RecordCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("kind", &self.kind)
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MockStorageBackend};
    use palaver_common::PalaverError;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    #[tokio::test]
    async fn test_store_then_load_hits_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let cache: RecordCache<Counter> = RecordCache::new(backend.clone(), RecordKind::Settings, 16);

        cache.store("user:1", &Counter { value: 3 }).await.unwrap();
        assert_eq!(cache.load("user:1").await.unwrap(), Some(Counter { value: 3 }));
        assert_eq!(cache.metrics().hits.load(Ordering::Relaxed), 1);
        assert_eq!(backend.count(RecordKind::Settings), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cached_value() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_put()
            .returning(|_, _, _| Err(PalaverError::persistence("disk full")));
        backend.expect_get().never();

        let cache: RecordCache<Counter> = RecordCache::new(Arc::new(backend), RecordKind::Memory, 16);
        let result = cache.store("user:1", &Counter { value: 9 }).await;

        assert!(matches!(result, Err(PalaverError::Persistence { .. })));
        assert_eq!(cache.load("user:1").await.unwrap(), Some(Counter { value: 9 }));
        assert_eq!(cache.metrics().write_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_records() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put(RecordKind::Settings, "user:1", b"{\"value\":1}".to_vec()).await.unwrap();
        backend.put(RecordKind::Settings, "user:2", b"not json".to_vec()).await.unwrap();

        let cache: RecordCache<Counter> = RecordCache::new(backend, RecordKind::Settings, 16);
        let listed = cache.list().await.unwrap();
        assert_eq!(listed, vec![("user:1".to_string(), Counter { value: 1 })]);
    }
}
