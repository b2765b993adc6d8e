use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};

use super::{CacheKey, CacheOutcome, CacheStore, StoreError};
use crate::config::RedisCacheConfig;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// A [`CacheStore`] backed by an externally managed Redis server.
///
/// Values are written with `SET key value PX <ttl>`, so expiry is handled by Redis itself. A `nil`
/// reply to `GET` is a [`CacheOutcome::Miss`]; connection failures, protocol errors and timeouts
/// are [`CacheOutcome::StoreError`]s.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    operation_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the Redis server described by `config`.
    ///
    /// The returned store reconnects on its own when the connection drops later on.
    pub async fn connect(config: &RedisCacheConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())?;
        let connection = with_timeout(
            config.operation_timeout,
            ConnectionManager::new(client),
        )
        .await?;

        tracing::info!(timeout = ?config.operation_timeout, "Connected to redis cache store");
        Ok(Self {
            connection,
            operation_timeout: config.operation_timeout,
        })
    }
}

async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result?),
        Err(_elapsed) => Err(StoreError::Timeout(timeout)),
    }
}

impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheOutcome<Vec<u8>>> {
        async move {
            let mut connection = self.connection.clone();
            let mut cmd = redis::cmd("GET");
            cmd.arg(key.as_str());

            let reply: Result<Option<Vec<u8>>, StoreError> =
                with_timeout(self.operation_timeout, cmd.query_async(&mut connection)).await;
            match reply {
                Ok(Some(data)) => CacheOutcome::Hit(data),
                Ok(None) => CacheOutcome::Miss,
                Err(err) => CacheOutcome::StoreError(err),
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
            let mut connection = self.connection.clone();
            // Redis rejects a zero expiry, so the TTL is rounded up to at least one millisecond.
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let mut cmd = redis::cmd("SET");
            cmd.arg(key.as_str()).arg(value).arg("PX").arg(ttl_ms);

            let _: () = with_timeout(self.operation_timeout, cmd.query_async(&mut connection)).await?;
            Ok(())
        }
        .boxed()
    }
}
