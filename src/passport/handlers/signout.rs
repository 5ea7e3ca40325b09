use crate::{
    authorize::params::PASSPORT_CLIENT_ID,
    error::PassportError,
    passport::state::PassportState,
    session::flash::FlashMessage,
};
use axum::{
    extract::{Extension, Query},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SignoutQuery {
    /// Session scope, defaults to passport
    client_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/signout",
    params(SignoutQuery),
    responses((status = 303, description = "Session destroyed")),
    tag = "authenticate"
)]
pub async fn signout(
    state: Extension<Arc<PassportState>>,
    Query(query): Query<SignoutQuery>,
) -> Result<Response, PassportError> {
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| PASSPORT_CLIENT_ID.to_string());

    state.sessions().destroy_user_session(
        &format!("/authenticate/{client_id}"),
        Some(FlashMessage::Signout),
        &client_id,
    )
}
