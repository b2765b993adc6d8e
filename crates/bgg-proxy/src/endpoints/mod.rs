use axum::Router;
use axum::routing::get;
use bgg_proxy_service::metric;
use bgg_proxy_service::services::BggService;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

mod error;
mod games;
mod metrics;
mod users;

pub use error::ResponseError;
use metrics::MetricsLayer;

use games::{find_game, get_game, get_thing};
use users::get_user;

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: BggService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);
    Router::new()
        .route("/games", get(find_game))
        .route("/games/{bgg_id}", get(get_game))
        .route("/things/{bgg_id}", get(get_thing))
        .route("/users/{username}", get(get_user))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
