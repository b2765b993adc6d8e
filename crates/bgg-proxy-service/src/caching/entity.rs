use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CacheKey, CacheOutcome, CacheStore, EntityKind, StoreError};

/// Typed access to the cached entities of one [`EntityKind`].
///
/// Owns the key namespace and the TTL of its kind, and stores values as JSON in the shared
/// [`CacheStore`]. A stored payload that does not decode into `V` is reported as a
/// [`StoreError::Malformed`], never as a miss.
pub struct EntityCache<V> {
    store: Arc<dyn CacheStore>,
    prefix: Arc<str>,
    kind: EntityKind,
    ttl: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for EntityCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: Arc::clone(&self.prefix),
            kind: self.kind,
            ttl: self.ttl,
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for EntityCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("store", &self.store.name())
            .field("prefix", &self.prefix)
            .field("kind", &self.kind)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V> EntityCache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CacheStore>, prefix: &str, kind: EntityKind, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            kind,
            ttl,
            _value: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The full store key for `identifier`.
    pub fn key(&self, identifier: impl fmt::Display) -> CacheKey {
        CacheKey::new(&self.prefix, self.kind, identifier)
    }

    /// Reads the entity stored for `identifier`.
    pub async fn get(&self, identifier: impl fmt::Display) -> CacheOutcome<V> {
        let key = self.key(identifier);
        let outcome = self.store.get(&key).await.and_then(|data| {
            serde_json::from_slice(&data).map_err(StoreError::from)
        });

        if let CacheOutcome::StoreError(ref err) = outcome {
            tracing::warn!(
                error = err as &dyn std::error::Error,
                key = %key,
                store = self.store.name(),
                "Failed to read from cache store",
            );
        }
        outcome
    }

    /// Stores `value` for `identifier` with this kind's TTL.
    pub async fn set(&self, identifier: impl fmt::Display, value: &V) -> Result<(), StoreError> {
        let key = self.key(identifier);
        let data = serde_json::to_vec(value)?;
        tracing::trace!(key = %key, ttl = ?self.ttl, "Writing {} to cache store", self.kind);
        self.store.set(&key, data, self.ttl).await
    }
}
