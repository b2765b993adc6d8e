//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`FakeBgg`] or [`Server`], make sure that the server is held until all requests
//!    to it have been made. The server stops serving when dropped, and all connections to it
//!    will fail. To avoid this, assign it to a variable: `let server = FakeBgg::new();`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{OriginalUri, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub mod fixtures;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the proxy crates and mutes all
///    other logs (such as hyper or redis).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("bgg_proxy_service=trace,bgg_proxy=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving the given `router`.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
struct FakeBggState {
    hits: Mutex<BTreeMap<String, usize>>,
    authorization: Mutex<Option<String>>,
    status: Mutex<Option<StatusCode>>,
    delay: Mutex<Option<Duration>>,
}

/// A stand-in for the BGG XML API 2, serving [`fixtures`].
///
/// - `/xmlapi2/thing?id=<ids>` answers with the fixture items for the ids `42`, `43` and `44`.
///   Other ids are left out, as BGG does.
/// - `/xmlapi2/user?name=alice` answers with [`fixtures::USER_ALICE`], every other name is
///   unknown.
///
/// Every request is counted by its path and query. Responses can be delayed, or replaced by a
/// bare status code.
pub struct FakeBgg {
    server: Server,
    state: Arc<FakeBggState>,
}

impl FakeBgg {
    pub fn new() -> Self {
        let state = Arc::new(FakeBggState::default());

        let router = Router::new()
            .route("/xmlapi2/thing", get(thing))
            .route("/xmlapi2/user", get(user))
            .layer(middleware::from_fn_with_state(Arc::clone(&state), track));

        let server = Server::with_router(router);
        Self { server, state }
    }

    /// The base URL of the fake API, including the trailing slash.
    pub fn base_url(&self) -> Url {
        self.server.url("/xmlapi2/")
    }

    /// Returns the number of requests since the last call, and resets the counters.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.state.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns the number of requests made to the given path and query.
    pub fn hits(&self, path_and_query: &str) -> usize {
        let hits = self.state.hits.lock().unwrap();
        hits.get(path_and_query).copied().unwrap_or_default()
    }

    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.state.hits.lock().unwrap());
        map.into_iter().collect()
    }

    /// The `Authorization` header of the most recent request.
    pub fn last_authorization(&self) -> Option<String> {
        self.state.authorization.lock().unwrap().clone()
    }

    /// Answers all following requests with an empty response of the given status.
    pub fn respond_with_status(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap();
        *self.state.status.lock().unwrap() = Some(status);
    }

    /// Delays all following responses.
    pub fn delay_responses(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }
}

impl Default for FakeBgg {
    fn default() -> Self {
        Self::new()
    }
}

async fn track(
    State(state): State<Arc<FakeBggState>>,
    OriginalUri(uri): OriginalUri,
    request: Request,
    next: Next,
) -> Response {
    {
        let mut hits = state.hits.lock().unwrap();
        let key = uri
            .path_and_query()
            .map(|path| path.as_str().to_owned())
            .unwrap_or_default();
        *hits.entry(key).or_default() += 1;
    }
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    *state.authorization.lock().unwrap() = authorization;

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = *state.status.lock().unwrap();
    match status {
        Some(status) => status.into_response(),
        None => next.run(request).await,
    }
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], body).into_response()
}

async fn thing(Query(params): Query<HashMap<String, String>>) -> Response {
    let ids = params.get("id").map(String::as_str).unwrap_or_default();

    let mut body = String::from(fixtures::ITEMS_HEADER);
    for id in ids.split(',') {
        let item = match id.trim() {
            "42" => fixtures::ITEM_42,
            "43" => fixtures::ITEM_43,
            "44" => fixtures::ITEM_44,
            _ => continue,
        };
        body.push_str(item);
    }
    body.push_str(fixtures::ITEMS_FOOTER);

    xml(body)
}

async fn user(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("name").map(String::as_str) {
        Some("alice") => xml(fixtures::USER_ALICE.to_owned()),
        _ => xml(fixtures::USER_UNKNOWN.to_owned()),
    }
}

/// Returns the URL of a Redis server for testing, from `BGG_PROXY_TEST_REDIS_URL`.
///
/// Use the `redis_url!()` macro instead which will skip correctly.
pub fn redis_url_from_env() -> Option<String> {
    std::env::var("BGG_PROXY_TEST_REDIS_URL")
        .ok()
        .filter(|url| !url.is_empty())
}

/// Returns the URL of a Redis server for testing.
///
/// If no server is configured this will exit the test early, as a poor substitute for skipping
/// tests.
#[macro_export]
macro_rules! redis_url {
    () => {
        match $crate::redis_url_from_env() {
            Some(url) => url,
            None => {
                println!("Skipping due to missing BGG_PROXY_TEST_REDIS_URL");
                return;
            }
        }
    };
}
