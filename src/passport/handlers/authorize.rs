use crate::{
    authorize::{self, consent::ConsentData, params::AuthorizeQuery, AuthorizeForm},
    error::PassportError,
    passport::state::{PassportState, RequestContext},
};
use axum::{
    extract::{Extension, Form, Query},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/authorize",
    params(AuthorizeQuery),
    responses(
        (status = 200, description = "Consent required", body = ConsentData),
        (status = 303, description = "Redirect to authentication, the client or a sub-flow"),
        (status = 400, description = "Invalid authorization request")
    ),
    tag = "authorize"
)]
pub async fn authorize_get(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);
    authorize::authorize(&ctx, query).await
}

#[utoipa::path(
    post,
    path = "/authorize",
    request_body(content = AuthorizeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the client with a code, or access_denied"),
        (status = 400, description = "Invalid submission"),
        (status = 401, description = "Persona selects accounts of another identity")
    ),
    tag = "authorize"
)]
pub async fn authorize_post(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Form(form): Form<AuthorizeForm>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);
    authorize::submit(&ctx, form).await
}
