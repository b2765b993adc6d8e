use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};

use super::{CacheKey, CacheOutcome, CacheStore, StoreError};

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct InMemoryItem {
    /// When to evict this item.
    deadline: Instant,
    /// The stored payload.
    data: Arc<[u8]>,
}

/// A struct implementing [`moka::Expiry`] that uses the [`InMemoryItem`] deadline as the explicit
/// expiration time.
struct ItemExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed, this will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<Arc<str>, InMemoryItem> for ItemExpiration {
    fn expire_after_create(
        &self,
        _key: &Arc<str>,
        value: &InMemoryItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &Arc<str>,
        value: &InMemoryItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// A process-local [`CacheStore`] backed by `moka`.
///
/// Useful for single-instance deployments and tests. Entries expire individually according to the
/// TTL they were stored with, and the least recently used entries are evicted once `capacity`
/// entries are reached.
#[derive(Clone)]
pub struct MemoryStore {
    cache: moka::future::Cache<Arc<str>, InMemoryItem>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("bgg-proxy-memory-store")
            .expire_after(ItemExpiration)
            .build();
        Self { cache }
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheOutcome<Vec<u8>>> {
        async move {
            match self.cache.get(key.as_str()).await {
                // moka may hand out an item whose deadline just passed but which was not yet
                // evicted, so the deadline is checked again here.
                Some(item) if item.deadline > Instant::now() => CacheOutcome::Hit(item.data.to_vec()),
                _ => CacheOutcome::Miss,
            }
        }
        .boxed()
    }

    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        value: Vec<u8>,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let item = InMemoryItem {
                deadline: Instant::now() + ttl,
                data: value.into(),
            };
            self.cache.insert(Arc::from(key.as_str()), item).await;
            Ok(())
        }
        .boxed()
    }
}
