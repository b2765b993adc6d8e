use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

use super::CacheKey;

/// The result of reading a single key from a [`CacheStore`].
///
/// A [`Miss`](Self::Miss) is a normal outcome that permits fetching the value from its source,
/// whereas a [`StoreError`](Self::StoreError) must be surfaced to the caller as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome<T> {
    /// The key is present and has not expired.
    Hit(T),
    /// The key is absent or has expired.
    Miss,
    /// The store could not be reached or returned unusable data.
    StoreError(StoreError),
}

impl<T> CacheOutcome<T> {
    /// Maps a hit through a fallible conversion, turning conversion failures into store errors.
    pub fn and_then<U, F>(self, f: F) -> CacheOutcome<U>
    where
        F: FnOnce(T) -> Result<U, StoreError>,
    {
        match self {
            Self::Hit(value) => match f(value) {
                Ok(value) => CacheOutcome::Hit(value),
                Err(err) => CacheOutcome::StoreError(err),
            },
            Self::Miss => CacheOutcome::Miss,
            Self::StoreError(err) => CacheOutcome::StoreError(err),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// A failure of the backing cache store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached, or rejected the command.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer in time.
    #[error("cache store timed out after {0:?}")]
    Timeout(Duration),
    /// A stored payload could not be decoded, or a value could not be encoded for storage.
    #[error("malformed cache payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A key-value store with per-key expiry, shared by the whole process.
///
/// Implementations work on raw bytes; typed access goes through [`EntityCache`](super::EntityCache).
/// Both operations must be safe to call concurrently without external synchronization.
pub trait CacheStore: Send + Sync + 'static {
    /// A short name of the backend, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Looks up the bytes stored under `key`.
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheOutcome<Vec<u8>>>;

    /// Stores `value` under `key`, overwriting any previous value and resetting its expiry to `ttl`.
    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        value: Vec<u8>,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}
