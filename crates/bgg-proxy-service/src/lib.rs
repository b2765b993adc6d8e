//! Cache-fronted, request-coalescing access to the BoardGameGeek XML API.
//!
//! The crate is organized bottom-up:
//!
//! - [`caching`] contains the cache port ([`caching::CacheStore`]) with its Redis and in-memory
//!   backends, and the typed [`caching::EntityCache`] on top of it.
//! - [`upstream`] contains the [`upstream::BggApi`] abstraction and its HTTP implementation.
//! - [`services`] ties both together: the [`services::FetchCoordinator`] deduplicates concurrent
//!   lookups, and [`services::BggService`] resolves things and users through it.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod services;
pub mod types;
pub mod upstream;
