use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use bgg_proxy_service::services::BggService;
use bgg_proxy_service::types::{Game, ThingId, ThingItem};
use serde::Deserialize;

use super::ResponseError;

/// Query parameters of `GET /games`.
#[derive(Debug, Default, Deserialize)]
pub struct GameQuery {
    bgg_id: Option<String>,
}

async fn resolve_game(service: &BggService, raw_id: &str) -> Result<Json<Game>, ResponseError> {
    let id = ThingId::parse(raw_id).map_err(ResponseError::game)?;
    let game = service.fetch_game(id).await.map_err(ResponseError::game)?;
    Ok(Json(game))
}

pub async fn get_game(
    State(service): State<BggService>,
    Path(bgg_id): Path<String>,
) -> Result<Json<Game>, ResponseError> {
    resolve_game(&service, &bgg_id).await
}

/// Looks a game up by the `bgg_id` query parameter.
pub async fn find_game(
    State(service): State<BggService>,
    Query(query): Query<GameQuery>,
) -> Result<Json<Game>, ResponseError> {
    resolve_game(&service, query.bgg_id.as_deref().unwrap_or_default()).await
}

/// Returns the full thing as fetched from BGG.
pub async fn get_thing(
    State(service): State<BggService>,
    Path(bgg_id): Path<String>,
) -> Result<Json<Arc<ThingItem>>, ResponseError> {
    let id = ThingId::parse(&bgg_id).map_err(ResponseError::game)?;
    let thing = service.fetch_thing(id).await.map_err(ResponseError::game)?;
    Ok(Json(thing))
}
