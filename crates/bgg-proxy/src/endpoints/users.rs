use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use bgg_proxy_service::services::BggService;
use bgg_proxy_service::types::{BggUser, Username};

use super::ResponseError;

pub async fn get_user(
    State(service): State<BggService>,
    Path(username): Path<String>,
) -> Result<Json<Arc<BggUser>>, ResponseError> {
    let username = Username::parse(&username).map_err(ResponseError::user)?;
    let user = service.fetch_user(username).await.map_err(ResponseError::user)?;
    Ok(Json(user))
}
