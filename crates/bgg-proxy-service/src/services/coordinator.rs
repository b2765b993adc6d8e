use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use sentry::{Hub, SentryFutureExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::caching::{CacheOutcome, EntityCache, EntityKind};
use crate::types::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, FetchError>>>;
type InFlight<K, V> = Arc<Mutex<HashMap<K, SharedFetch<V>>>>;

/// Cache-aside lookups with per-key request coalescing.
///
/// Every lookup consults the cache first. On a miss, concurrent lookups of the same key share a
/// single execution of the upstream function, and all of them observe the same outcome. A
/// successful value is written to the cache before the in-flight entry is removed, so callers
/// arriving after the fetch completed are served from the cache.
///
/// The fetch itself runs as a spawned task. Callers that stop waiting do not cancel it.
pub struct FetchCoordinator<K, V> {
    cache: EntityCache<V>,
    in_flight: InFlight<K, V>,
}

impl<K, V> Clone for FetchCoordinator<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<K, V> fmt::Debug for FetchCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self
            .in_flight
            .lock()
            .map(|in_flight| in_flight.len())
            .unwrap_or_default();
        f.debug_struct("FetchCoordinator")
            .field("cache", &self.cache)
            .field("in flight", &in_flight)
            .finish()
    }
}

/// Removes the in-flight entry of a fetch once its task finishes, even when it panicked.
struct Registration<K: Eq + Hash, V> {
    in_flight: InFlight<K, V>,
    kind: EntityKind,
    key: K,
}

impl<K: Eq + Hash, V> Drop for Registration<K, V> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&self.key);
        record_in_flight(in_flight.len(), self.kind);
    }
}

fn record_in_flight(len: usize, kind: EntityKind) {
    metric!(gauge("fetch.in_flight") = len as u64, "kind" => kind.as_ref());
}

impl<K, V> FetchCoordinator<K, V>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(cache: EntityCache<V>) -> Self {
        Self {
            cache,
            in_flight: Default::default(),
        }
    }

    pub fn cache(&self) -> &EntityCache<V> {
        &self.cache
    }

    /// The number of keys with a fetch currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the value for `key`, from the cache or by calling `upstream`.
    ///
    /// - A cache hit is returned without calling `upstream`.
    /// - A cache store error is returned without calling `upstream`.
    /// - On a miss, `upstream` is called unless a fetch for `key` is already in flight, in which
    ///   case the caller waits for that fetch instead and `upstream` is dropped uncalled.
    ///
    /// Nothing is retried, and a failed fetch leaves the cache untouched.
    pub async fn fetch_or_load<F, Fut>(&self, key: K, upstream: F) -> Result<Arc<V>, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let kind = self.cache.kind();
        metric!(counter("fetch.access") += 1, "kind" => kind.as_ref());

        let outcome = self.cache.get(&key).await;
        record_cache_outcome(&outcome, kind.as_ref());
        match outcome {
            CacheOutcome::Hit(value) => {
                tracing::trace!("Serving {} {} from cache", kind, key);
                return Ok(Arc::new(value));
            }
            CacheOutcome::StoreError(err) => return Err(err.into()),
            CacheOutcome::Miss => {}
        }

        let fetch = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key).cloned() {
                Some(fetch) => {
                    metric!(counter("fetch.coalesced") += 1, "kind" => kind.as_ref());
                    tracing::trace!("Joining in-flight fetch of {} {}", kind, key);
                    fetch
                }
                None => {
                    // The entry is inserted before the lock is released, so the task cannot
                    // remove it before it exists.
                    let fetch = self.spawn_fetch(key.clone(), upstream);
                    in_flight.insert(key, fetch.clone());
                    record_in_flight(in_flight.len(), kind);
                    fetch
                }
            }
        };

        fetch.await
    }

    fn spawn_fetch<F, Fut>(&self, key: K, upstream: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let kind = self.cache.kind();
        tracing::trace!("Spawning deduplicated fetch of {} {}", kind, key);

        let registration = Registration {
            in_flight: Arc::clone(&self.in_flight),
            kind,
            key: key.clone(),
        };
        let cache = self.cache.clone();
        let task = async move {
            let _registration = registration; // move into the future
            load(&cache, &key, upstream).await
        };
        let handle = tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(
                        error = &err as &dyn std::error::Error,
                        "Fetch of {} panicked",
                        kind
                    );
                    metric!(counter("fetch.panicked") += 1, "kind" => kind.as_ref());
                    Err(FetchError::Internal)
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn record_cache_outcome<T>(outcome: &CacheOutcome<T>, kind: &str) {
    match outcome {
        CacheOutcome::Hit(_) => metric!(counter("fetch.cache.hit") += 1, "kind" => kind),
        CacheOutcome::Miss => metric!(counter("fetch.cache.miss") += 1, "kind" => kind),
        CacheOutcome::StoreError(_) => metric!(counter("fetch.cache.error") += 1, "kind" => kind),
    }
}

/// The body of a fetch task: the upstream call and the cache write.
async fn load<K, V, F, Fut>(cache: &EntityCache<V>, key: &K, upstream: F) -> Result<Arc<V>, FetchError>
where
    K: fmt::Display,
    V: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, FetchError>>,
{
    let kind = cache.kind();

    // A fetch that completed between our miss and taking over the key has already written the
    // value, in which case BGG is not asked again.
    match cache.get(key).await {
        CacheOutcome::Hit(value) => return Ok(Arc::new(value)),
        CacheOutcome::StoreError(err) => return Err(err.into()),
        CacheOutcome::Miss => {}
    }

    metric!(counter("fetch.upstream") += 1, "kind" => kind.as_ref());
    let value = match upstream().await {
        Ok(value) => value,
        Err(err) => {
            metric!(
                counter("fetch.upstream.error") += 1,
                "kind" => kind.as_ref(),
                "error" => err.metrics_tag(),
            );
            tracing::debug!(
                error = &err as &dyn std::error::Error,
                "Failed to fetch {} {}",
                kind,
                key
            );
            return Err(err);
        }
    };

    if let Err(err) = cache.set(key, &value).await {
        // The value is still handed out, it is just not cached.
        metric!(counter("fetch.cache.write_failed") += 1, "kind" => kind.as_ref());
        tracing::error!(
            error = &err as &dyn std::error::Error,
            key = %cache.key(key),
            "Failed to write fetched {} to cache",
            kind
        );
    }

    Ok(Arc::new(value))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    use crate::caching::tests::FailingStore;
    use crate::caching::{CacheKey, CacheStore, EntityKind, MemoryStore, StoreError};
    use crate::types::{ThingId, ThingItem};
    use crate::upstream::UpstreamError;

    fn thing(id: u32) -> ThingItem {
        ThingItem {
            id,
            kind: "boardgame".into(),
            names: vec![],
            year_published: None,
            min_players: None,
            max_players: None,
            playing_time: None,
            description: None,
            thumbnail: None,
            image: None,
            links: vec![],
        }
    }

    fn coordinator(store: Arc<dyn CacheStore>) -> FetchCoordinator<ThingId, ThingItem> {
        let cache = EntityCache::new(store, "bgg", EntityKind::Thing, Duration::from_secs(3600));
        FetchCoordinator::new(cache)
    }

    fn memory_coordinator() -> FetchCoordinator<ThingId, ThingItem> {
        coordinator(Arc::new(MemoryStore::new(100)))
    }

    fn id(id: u32) -> ThingId {
        ThingId::new(id).unwrap()
    }

    /// An upstream returning `thing(id)` after `delay`, counting its executions.
    fn counting_upstream(
        calls: &Arc<AtomicUsize>,
        id: u32,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<ThingItem, FetchError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(thing(id))
            }
            .boxed()
        }
    }

    async fn panicking_upstream() -> Result<ThingItem, FetchError> {
        panic!("upstream must not be called");
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits() {
        let coordinator = memory_coordinator();
        coordinator.cache().set(7, &thing(7)).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let value = coordinator
            .fetch_or_load(id(7), counting_upstream(&calls, 7, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(*value, thing(7));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prepopulated_cache_never_calls_upstream() {
        let coordinator = memory_coordinator();
        coordinator.cache().set(42, &thing(42)).await.unwrap();

        let value = coordinator
            .fetch_or_load(id(42), panicking_upstream)
            .await
            .unwrap();
        assert_eq!(value.id, 42);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..16).map(|_| {
            coordinator.fetch_or_load(id(1), counting_upstream(&calls, 1, Duration::from_millis(50)))
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_two_slow_lookups_share_one_fetch() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            let upstream = counting_upstream(&calls, 42, Duration::from_millis(50));
            async move { coordinator.fetch_or_load(id(42), upstream).await }
        });
        let second = tokio::spawn({
            let coordinator = coordinator.clone();
            let upstream = counting_upstream(&calls, 42, Duration::from_millis(50));
            async move { coordinator.fetch_or_load(id(42), upstream).await }
        });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.kind, "boardgame");
        assert_eq!(coordinator.cache().get(42).await, CacheOutcome::Hit(thing(42)));
    }

    #[tokio::test]
    async fn test_fetch_populates_cache() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(coordinator.cache().get(3).await, CacheOutcome::Miss);
        coordinator
            .fetch_or_load(id(3), counting_upstream(&calls, 3, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(coordinator.cache().get(3).await, CacheOutcome::Hit(thing(3)));

        // later lookups are served from the cache
        coordinator
            .fetch_or_load(id(3), counting_upstream(&calls, 3, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_are_not_coalesced() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = futures::join!(
            coordinator.fetch_or_load(id(1), counting_upstream(&calls, 1, Duration::from_millis(20))),
            coordinator.fetch_or_load(id(2), counting_upstream(&calls, 2, Duration::from_millis(20))),
        );

        assert_eq!(a.unwrap().id, 1);
        assert_eq!(b.unwrap().id, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_error_skips_upstream() {
        let store = Arc::new(FailingStore::default());
        let coordinator = coordinator(store.clone());

        let result = coordinator.fetch_or_load(id(5), panicking_upstream).await;

        assert_eq!(
            result,
            Err(FetchError::Store(StoreError::Unavailable(
                "connection refused".into()
            )))
        );
        assert_eq!(store.sets.load(Ordering::Relaxed), 0);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_shared_and_not_cached() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = || {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<ThingItem, _>(FetchError::Upstream(UpstreamError::Status(500)))
            }
        };

        let (a, b) = futures::join!(
            coordinator.fetch_or_load(id(9), failing()),
            coordinator.fetch_or_load(id(9), failing()),
        );

        let expected = Err(FetchError::Upstream(UpstreamError::Status(500)));
        assert_eq!(a, expected);
        assert_eq!(b, expected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.cache().get(9).await, CacheOutcome::Miss);

        // nothing is remembered, the next lookup asks again
        let result = coordinator
            .fetch_or_load(id(9), counting_upstream(&calls, 9, Duration::ZERO))
            .await;
        assert_eq!(result.unwrap().id, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let coordinator = memory_coordinator();

        let result = coordinator
            .fetch_or_load(id(11), || async { Err::<ThingItem, _>(FetchError::NotFound) })
            .await;

        assert_eq!(result, Err(FetchError::NotFound));
        assert_eq!(coordinator.cache().get(11).await, CacheOutcome::Miss);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_fetch() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            let upstream = counting_upstream(&calls, 4, Duration::from_millis(50));
            async move { coordinator.fetch_or_load(id(4), upstream).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.cache().get(4).await, CacheOutcome::Hit(thing(4)));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_upstream_reaches_all_waiters() {
        let coordinator = memory_coordinator();

        let slow_panic = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            panicking_upstream().await
        };
        let (a, b) = futures::join!(
            coordinator.fetch_or_load(id(13), slow_panic),
            coordinator.fetch_or_load(id(13), slow_panic),
        );

        assert_eq!(a, Err(FetchError::Internal));
        assert_eq!(b, Err(FetchError::Internal));
        assert_eq!(coordinator.in_flight(), 0);

        // the key is usable again afterwards
        let calls = Arc::new(AtomicUsize::new(0));
        let value = coordinator
            .fetch_or_load(id(13), counting_upstream(&calls, 13, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(value.id, 13);
    }

    /// A store that always misses and never accepts writes.
    #[derive(Debug, Default)]
    struct ReadOnlyStore;

    impl CacheStore for ReadOnlyStore {
        fn name(&self) -> &'static str {
            "read-only"
        }

        fn get<'a>(&'a self, _key: &'a CacheKey) -> BoxFuture<'a, CacheOutcome<Vec<u8>>> {
            async { CacheOutcome::Miss }.boxed()
        }

        fn set<'a>(
            &'a self,
            _key: &'a CacheKey,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            async { Err(StoreError::Unavailable("read only".into())) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_failed_cache_write_still_returns_value() {
        let coordinator = coordinator(Arc::new(ReadOnlyStore));
        let calls = Arc::new(AtomicUsize::new(0));

        let value = coordinator
            .fetch_or_load(id(21), counting_upstream(&calls, 21, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(*value, thing(21));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_tracks_running_fetches() {
        let coordinator = memory_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = tokio::spawn({
            let coordinator = coordinator.clone();
            let upstream = counting_upstream(&calls, 8, Duration::from_millis(50));
            async move { coordinator.fetch_or_load(id(8), upstream).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.in_flight(), 1);

        fetch.await.unwrap().unwrap();
        assert_eq!(coordinator.in_flight(), 0);
    }

    /// A store that misses once and then serves `payload`, as if a concurrent fetch had just
    /// written it.
    struct LateWriteStore {
        payload: Vec<u8>,
        gets: AtomicUsize,
    }

    impl CacheStore for LateWriteStore {
        fn name(&self) -> &'static str {
            "late-write"
        }

        fn get<'a>(&'a self, _key: &'a CacheKey) -> BoxFuture<'a, CacheOutcome<Vec<u8>>> {
            async move {
                match self.gets.fetch_add(1, Ordering::SeqCst) {
                    0 => CacheOutcome::Miss,
                    _ => CacheOutcome::Hit(self.payload.clone()),
                }
            }
            .boxed()
        }

        fn set<'a>(
            &'a self,
            _key: &'a CacheKey,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            async { Ok(()) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_value_written_after_miss_skips_upstream() {
        let store = Arc::new(LateWriteStore {
            payload: serde_json::to_vec(&thing(42)).unwrap(),
            gets: AtomicUsize::new(0),
        });
        let coordinator = coordinator(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let value = coordinator
            .fetch_or_load(id(42), counting_upstream(&calls, 42, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(*value, thing(42));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.in_flight(), 0);
    }
}
