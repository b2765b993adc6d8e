//! Access to the BGG XML API 2.
//!
//! [`BggApi`] is the seam between the resolvers and BGG. The production implementation is the
//! HTTP [`BggClient`]; tests substitute counting or failing fakes.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::types::{BggUser, ThingItem};

mod client;
mod xml;

pub use client::BggClient;
pub use xml::{parse_things, parse_user};

/// A failed request to BGG.
///
/// Upstream errors are shared verbatim by every caller of a coalesced lookup, so they carry
/// rendered messages instead of the source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// BGG accepted the request but queued it for later processing.
    #[error("request queued by BGG, try again later")]
    Queued,
    /// BGG rejected the request because of rate limiting.
    #[error("rate limited by BGG")]
    RateLimited,
    /// BGG responded with an unexpected status code.
    #[error("BGG responded with status {0}")]
    Status(u16),
    /// The request could not be sent or the response could not be read.
    #[error("failed to reach BGG: {0}")]
    Transport(String),
    /// The request did not complete within the configured timeout.
    #[error("request to BGG timed out")]
    Timeout,
    /// The response body was not the XML document we expected.
    #[error("malformed BGG response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Whether BGG itself asked us to back off, as opposed to the request failing.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Queued | Self::RateLimited)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The remote lookups the resolvers depend on.
///
/// Implementations perform exactly one remote request per call and never retry.
pub trait BggApi: Send + Sync + 'static {
    /// Fetches the things with the given ids, of any type.
    ///
    /// Ids unknown to BGG are missing from the result.
    fn things<'a>(&'a self, ids: &'a [u32]) -> BoxFuture<'a, Result<Vec<ThingItem>, UpstreamError>>;

    /// Fetches a user by name, returning `None` if BGG does not know the user.
    fn user<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<BggUser>, UpstreamError>>;
}
