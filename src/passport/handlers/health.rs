use crate::{passport::state::PassportState, GIT_COMMIT_HASH};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    core: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Core service is reachable", body = Health),
        (status = 503, description = "Core service is unreachable", body = Health)
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(state: Extension<Arc<PassportState>>) -> impl IntoResponse {
    let core = match state.core().get_scopes().await {
        Ok(_) => Ok(()),
        Err(err) => {
            error!("Failed to reach core service: {}", err);

            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        core: if core.is_ok() { "ok" } else { "error" }.to_string(),
    };

    let status = core.err().unwrap_or(StatusCode::OK);

    (status, Json(health))
}
