//! # Caching infrastructure
//!
//! Every BGG request is slow and rate-limited, so everything the proxy fetches is cached in a
//! shared key-value store. This module contains the cache port and its backends.
//!
//! ## Layers
//!
//! - [`CacheStore`] is the process-wide, object-safe store abstraction. It works on raw bytes and
//!   full [`CacheKey`]s, and every read results in a three-way [`CacheOutcome`]: a hit, an explicit
//!   miss, or a store error. Callers rely on the difference between the latter two: a miss allows
//!   fetching from BGG, a store error does not.
//! - [`EntityCache`] is a typed view for one [`EntityKind`]. It owns the namespace and TTL of that
//!   kind, and (de)serializes values as JSON. Undecodable payloads are store errors.
//!
//! Request coalescing is not part of this module; see
//! [`FetchCoordinator`](crate::services::FetchCoordinator).
//!
//! ## Backends
//!
//! - [`RedisStore`] is the production backend. Keys expire through Redis' own `PX` expiry.
//! - [`MemoryStore`] is an in-process `moka` cache with per-entry expiry, used for tests and for
//!   running a single instance without Redis.
//!
//! The backend is chosen by [`CacheConfig::backend`]. Without an explicit choice, `REDIS_URL`
//! selects Redis, and the memory store is used otherwise.
//!
//! ## Keys
//!
//! Keys are `<prefix>:<kind>:<identifier>`, e.g. `bgg:thing:42` or `bgg:user:alice`.
//!
//! ### Metrics
//!
//! The cache port itself does not emit metrics. The coordinator tags its `fetch.*` counters with
//! the entity kind instead.

use std::sync::Arc;

use crate::config::{CacheBackendConfig, CacheConfig};

mod cache_key;
mod entity;
mod memory;
mod redis_store;
mod store;

pub use cache_key::{CacheKey, EntityKind};
pub use entity::EntityCache;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CacheOutcome, CacheStore, StoreError};

/// Creates the cache store configured in `config`.
pub async fn create_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, StoreError> {
    let store: Arc<dyn CacheStore> = match config.backend() {
        CacheBackendConfig::Redis(redis_config) => {
            Arc::new(RedisStore::connect(&redis_config).await?)
        }
        CacheBackendConfig::Memory(memory) => {
            tracing::info!(capacity = memory.capacity, "Using in-memory cache store");
            Arc::new(MemoryStore::new(memory.capacity))
        }
    };
    Ok(store)
}
