//! Email one-time code sign-in.

use super::pending_params;
use crate::{
    email::{issue_email_code, verify_email_code, EmailChallenge},
    error::PassportError,
    linker::authenticate_account,
    nonce::force_account_creation,
    passport::state::{PassportState, RequestContext},
};
use axum::{
    extract::{Extension, Form, Path},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailForm {
    address: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailVerifyForm {
    address: String,
    code: String,
    state: String,
}

#[utoipa::path(
    post,
    path = "/authenticate/{client_id}/email",
    request_body(content = EmailForm, content_type = "application/x-www-form-urlencoded"),
    params(("client_id" = String, Path, description = "Client the user signs in for")),
    responses(
        (status = 200, description = "Code sent", body = EmailChallenge),
        (status = 400, description = "Invalid email address")
    ),
    tag = "authenticate"
)]
pub async fn send_code(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Path(_client_id): Path<String>,
    Form(form): Form<EmailForm>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);
    let challenge = issue_email_code(ctx.core(), &form.address).await?;
    Ok(Json(challenge).into_response())
}

#[utoipa::path(
    post,
    path = "/authenticate/{client_id}/email/verify",
    request_body(content = EmailVerifyForm, content_type = "application/x-www-form-urlencoded"),
    params(("client_id" = String, Path, description = "Client the user signs in for")),
    responses(
        (status = 303, description = "Signed in, or connect result"),
        (status = 400, description = "Invalid or expired code state"),
        (status = 401, description = "Wrong code")
    ),
    tag = "authenticate"
)]
pub async fn verify_code(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Path(client_id): Path<String>,
    Form(form): Form<EmailVerifyForm>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let params = pending_params(&ctx, &client_id);
    let prior_session = ctx
        .sessions()
        .user_session(ctx.headers(), &params.client_id)
        .map(|session| session.jwt);

    let (account, resolution) = verify_email_code(
        ctx.core(),
        &form.address,
        &form.code,
        &form.state,
        prior_session.as_deref(),
        force_account_creation(params.rollup_action.as_ref()),
    )
    .await?;

    authenticate_account(&ctx, &account, resolution, &params).await
}
