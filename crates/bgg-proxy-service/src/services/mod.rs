//! Provides the BGG resolvers and a way to initialize them.
//!
//! The main [`create_service`] fn connects the configured cache store, creates the BGG client and
//! returns the [`BggService`] that all callers share.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::caching::create_store;
use crate::config::Config;
use crate::upstream::BggClient;

mod bgg;
mod coordinator;

pub use bgg::BggService;
pub use coordinator::FetchCoordinator;

pub async fn create_service(config: &Config) -> Result<BggService> {
    let store = create_store(&config.cache)
        .await
        .context("failed to connect to the cache store")?;
    let client = BggClient::new(&config.upstream).context("failed to create the BGG client")?;

    tracing::info!(
        store = store.name(),
        upstream = %config.upstream.base_url,
        "Created BGG service"
    );

    Ok(BggService::new(
        store,
        Arc::new(client),
        &config.cache,
        &config.upstream.thing_type,
    ))
}
