//! Helpers for testing the web server and service.

use std::sync::Arc;

use bgg_proxy_service::caching::MemoryStore;
use bgg_proxy_service::config::{CacheConfig, UpstreamConfig};
use bgg_proxy_service::services::BggService;
use bgg_proxy_service::upstream::BggClient;

pub use bgg_proxy_test::*;

/// Spawns the full web app on a random port, backed by an in-memory cache and `bgg`.
pub fn server_with_fake_bgg(bgg: &FakeBgg) -> Server {
    let config = UpstreamConfig {
        base_url: bgg.base_url(),
        ..Default::default()
    };
    let api = BggClient::new(&config).unwrap();
    let service = BggService::new(
        Arc::new(MemoryStore::new(1000)),
        Arc::new(api),
        &CacheConfig::default(),
        &config.thing_type,
    );

    Server::with_router(crate::endpoints::create_app(service))
}
