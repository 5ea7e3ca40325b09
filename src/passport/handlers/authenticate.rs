//! Authentication landing and wallet sign-in.

use super::pending_params;
use crate::{
    authorize::params::is_first_party,
    core::AppPublicProps,
    error::PassportError,
    linker::authenticate_account,
    nonce::{
        force_account_creation, generate_state, is_valid_address, issue_nonce,
        sign_message_template, verify_nonce, wallet_account_urn, NonceChallenge,
    },
    passport::state::{PassportState, RequestContext},
    session::{append_cookies, flash::FlashMessage, session_identity},
};
use axum::{
    extract::{Extension, Form, Path},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateLanding {
    client_id: String,
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    app: Option<AppPublicProps>,
    #[schema(value_type = Option<String>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    flash: Option<FlashMessage>,
    authenticated: bool,
}

async fn app_props(
    ctx: &RequestContext,
    client_id: &str,
) -> Result<Option<AppPublicProps>, PassportError> {
    if is_first_party(client_id) {
        return Ok(None);
    }
    Ok(Some(ctx.core().get_app_public_props(client_id).await?))
}

#[utoipa::path(
    get,
    path = "/authenticate/{client_id}",
    params(("client_id" = String, Path, description = "Client the user signs in for")),
    responses(
        (status = 200, description = "Landing data; consumes the flash notice", body = AuthenticateLanding),
        (status = 400, description = "Unknown client")
    ),
    tag = "authenticate"
)]
pub async fn landing(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Path(client_id): Path<String>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let app = app_props(&ctx, &client_id).await?;
    let (flash, clear) = ctx.sessions().take_flash(ctx.headers())?;
    let authenticated = session_identity(&ctx, &client_id).is_some();

    let mut response = Json(AuthenticateLanding {
        client_id,
        app,
        flash,
        authenticated,
    })
    .into_response();

    if flash.is_some() {
        append_cookies(&mut response, vec![clear]);
    }

    Ok(response)
}

#[utoipa::path(
    get,
    path = "/authenticate/{client_id}/sign/{address}",
    params(
        ("client_id" = String, Path, description = "Client the user signs in for"),
        ("address" = String, Path, description = "Ethereum address, 0x prefixed")
    ),
    responses(
        (status = 200, description = "Challenge to sign", body = NonceChallenge),
        (status = 400, description = "Invalid address")
    ),
    tag = "authenticate"
)]
pub async fn challenge(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Path((client_id, address)): Path<(String, String)>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let params = pending_params(&ctx, &client_id);
    let app = app_props(&ctx, &params.client_id).await?;

    let challenge = issue_nonce(
        ctx.core(),
        &address,
        sign_message_template(app.as_ref()),
        &generate_state(),
        &params.scope,
        &params.redirect_uri,
    )
    .await?;

    Ok(Json(challenge).into_response())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignForm {
    nonce: String,
    signature: String,
}

#[utoipa::path(
    post,
    path = "/authenticate/{client_id}/sign/{address}",
    request_body(content = SignForm, content_type = "application/x-www-form-urlencoded"),
    params(
        ("client_id" = String, Path, description = "Client the user signs in for"),
        ("address" = String, Path, description = "Ethereum address that signed")
    ),
    responses(
        (status = 303, description = "Signed in, or connect result"),
        (status = 400, description = "Invalid, expired or reused nonce"),
        (status = 401, description = "Invalid signature")
    ),
    tag = "authenticate"
)]
pub async fn sign(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
    Path((client_id, address)): Path<(String, String)>,
    Form(form): Form<SignForm>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    if !is_valid_address(&address) {
        return Err(PassportError::bad_request(format!("invalid address: {address}")));
    }

    let params = pending_params(&ctx, &client_id);
    let account = wallet_account_urn(&address);
    let prior_session = ctx
        .sessions()
        .user_session(ctx.headers(), &params.client_id)
        .map(|session| session.jwt);

    let resolution = verify_nonce(
        ctx.core(),
        &account,
        &form.nonce,
        &form.signature,
        prior_session.as_deref(),
        force_account_creation(params.rollup_action.as_ref()),
    )
    .await?;

    authenticate_account(&ctx, &account, resolution, &params).await
}
