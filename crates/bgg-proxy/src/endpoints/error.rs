use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bgg_proxy_service::types::FetchError;
use serde::{Deserialize, Serialize};

/// The entity an endpoint resolves, which selects the error codes of its responses.
#[derive(Debug, Clone, Copy)]
pub enum Entity {
    Game,
    User,
}

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    code: &'static str,
    message: String,
    err: FetchError,
}

impl ResponseError {
    pub fn new(entity: Entity, err: FetchError) -> Self {
        let (status, code, message) = match (&err, entity) {
            (FetchError::InvalidId(detail), Entity::Game) => (
                StatusCode::BAD_REQUEST,
                "bgg_game_id_missing",
                format!("BGG game ID is missing or invalid: {detail}"),
            ),
            (FetchError::InvalidId(detail), Entity::User) => (
                StatusCode::BAD_REQUEST,
                "bgg_username_missing",
                format!("BGG username is missing or invalid: {detail}"),
            ),
            (FetchError::NotFound, Entity::Game) => (
                StatusCode::NOT_FOUND,
                "bgg_game_not_found",
                "BGG game not found".to_owned(),
            ),
            (FetchError::NotFound, Entity::User) => (
                StatusCode::NOT_FOUND,
                "bgg_user_not_found",
                "BGG user not found".to_owned(),
            ),
            (FetchError::Upstream(upstream), _) if upstream.is_transient() => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
                upstream.to_string(),
            ),
            (FetchError::Store(_) | FetchError::Upstream(_) | FetchError::Internal, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
        };

        Self {
            status,
            code,
            message,
            err,
        }
    }

    pub fn game(err: FetchError) -> Self {
        Self::new(Entity::Game, err)
    }

    pub fn user(err: FetchError) -> Self {
        Self::new(Entity::User, err)
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            sentry::capture_error(&self.err);
        }
        let body = ApiErrorResponse {
            code: self.code.to_owned(),
            message: self.message,
        };
        let mut response = Json(body).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ApiErrorResponse {
    /// A stable, machine readable error code.
    pub code: String,
    /// A human readable description of the error.
    pub message: String,
}
