use std::fmt;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode, header};
use url::Url;

use super::{BggApi, UpstreamError, xml};
use crate::config::UpstreamConfig;
use crate::types::{BggUser, ThingItem};

const USER_AGENT: &str = concat!("bgg-proxy/", env!("CARGO_PKG_VERSION"));

/// [`BggApi`] implementation talking to the BGG XML API 2 over HTTP.
#[derive(Clone)]
pub struct BggClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for BggClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BggClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BggClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|err| UpstreamError::Transport(format!("invalid BGG url: {err}")))
    }

    /// Performs a single `GET` and returns the body of a successful response.
    async fn get_document(&self, endpoint: &'static str, url: Url) -> Result<String, UpstreamError> {
        tracing::debug!("Fetching from BGG: `{}`", url);

        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, USER_AGENT);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let result = read_response(request).await;

        metric!(timer("upstream.request.duration") = start.elapsed(), "endpoint" => endpoint);
        if let Err(ref err) = result {
            tracing::debug!(
                error = err as &dyn std::error::Error,
                endpoint,
                "BGG request failed"
            );
        }
        result
    }

    async fn fetch_things(&self, ids: &[u32]) -> Result<Vec<ThingItem>, UpstreamError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.endpoint("thing")?;
        url.query_pairs_mut().append_pair("id", &ids);

        let document = self.get_document("thing", url).await?;
        xml::parse_things(&document)
    }

    async fn fetch_user(&self, name: &str) -> Result<Option<BggUser>, UpstreamError> {
        let mut url = self.endpoint("user")?;
        url.query_pairs_mut().append_pair("name", name);

        let document = self.get_document("user", url).await?;
        xml::parse_user(&document)
    }
}

async fn read_response(request: reqwest::RequestBuilder) -> Result<String, UpstreamError> {
    let response = request.send().await?;

    match response.status() {
        // BGG answers with 202 while it prepares a response in the background.
        StatusCode::ACCEPTED => Err(UpstreamError::Queued),
        StatusCode::TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited),
        status if status.is_success() => Ok(response.text().await?),
        status => Err(UpstreamError::Status(status.as_u16())),
    }
}

impl BggApi for BggClient {
    fn things<'a>(&'a self, ids: &'a [u32]) -> BoxFuture<'a, Result<Vec<ThingItem>, UpstreamError>> {
        self.fetch_things(ids).boxed()
    }

    fn user<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<BggUser>, UpstreamError>> {
        self.fetch_user(name).boxed()
    }
}
