use std::fmt;
use std::sync::Arc;

use crate::caching::{CacheStore, EntityCache, EntityKind};
use crate::config::CacheConfig;
use crate::types::{BOARDGAME_TYPE, BggUser, FetchError, Game, ThingId, ThingItem, Username};
use crate::upstream::BggApi;

use super::FetchCoordinator;

/// Resolves BGG things and users through the cache.
///
/// Things and users have separate cache namespaces and separate coalescing, but share the
/// cache store and the BGG client.
#[derive(Clone)]
pub struct BggService {
    things: FetchCoordinator<ThingId, ThingItem>,
    users: FetchCoordinator<Username, BggUser>,
    api: Arc<dyn BggApi>,
    thing_type: Arc<str>,
}

impl fmt::Debug for BggService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BggService")
            .field("things", &self.things)
            .field("users", &self.users)
            .field("thing_type", &self.thing_type)
            .finish_non_exhaustive()
    }
}

impl BggService {
    /// Creates the resolvers on top of a shared `store` and `api`.
    ///
    /// `thing_type` is the only thing subtype [`fetch_thing`](Self::fetch_thing) accepts.
    pub fn new(
        store: Arc<dyn CacheStore>,
        api: Arc<dyn BggApi>,
        config: &CacheConfig,
        thing_type: &str,
    ) -> Self {
        let things = EntityCache::new(
            Arc::clone(&store),
            &config.key_prefix,
            EntityKind::Thing,
            config.thing_ttl,
        );
        let users = EntityCache::new(store, &config.key_prefix, EntityKind::User, config.user_ttl);

        Self {
            things: FetchCoordinator::new(things),
            users: FetchCoordinator::new(users),
            api,
            thing_type: thing_type.into(),
        }
    }

    /// Resolves the thing with the given id.
    ///
    /// Items of other subtypes than the configured one are ignored. If BGG has no item of the
    /// right type, this is [`FetchError::NotFound`].
    pub async fn fetch_thing(&self, id: ThingId) -> Result<Arc<ThingItem>, FetchError> {
        let api = Arc::clone(&self.api);
        let thing_type = Arc::clone(&self.thing_type);

        self.things
            .fetch_or_load(id, move || async move {
                let items = api.things(&[id.get()]).await?;
                let total = items.len();
                let item = items
                    .into_iter()
                    .find(|item| item.kind == *thing_type)
                    .ok_or(FetchError::NotFound)?;

                if total > 1 {
                    tracing::debug!(total, "Ignored items of other types for thing {}", id);
                }
                Ok(item)
            })
            .await
    }

    /// Resolves the user with the given name.
    pub async fn fetch_user(&self, name: Username) -> Result<Arc<BggUser>, FetchError> {
        let api = Arc::clone(&self.api);

        self.users
            .fetch_or_load(name.clone(), move || async move {
                api.user(name.as_str()).await?.ok_or(FetchError::NotFound)
            })
            .await
    }

    /// Resolves a thing and projects it into a [`Game`].
    ///
    /// Only base board games are games. When the service resolves another subtype, this is
    /// [`FetchError::NotFound`].
    pub async fn fetch_game(&self, id: ThingId) -> Result<Game, FetchError> {
        let item = self.fetch_thing(id).await?;
        if item.kind != BOARDGAME_TYPE {
            return Err(FetchError::NotFound);
        }
        Ok(Game::from(item.as_ref()))
    }
}
