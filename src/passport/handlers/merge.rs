//! Explicit identity merge after an `ACCOUNT_LINKED_ERROR`.
//!
//! Only the identity that was signed in when the conflict was detected (the
//! merge target) may confirm, and only while the merge cookie is alive. The
//! session is looked up in the scope of the client whose connect request hit
//! the conflict, since the params cookies are gone by the time the user lands
//! here.

use super::last_params;
use crate::{
    authorize::params::RollupResult,
    core::MergePreview,
    error::PassportError,
    passport::state::{PassportState, RequestContext},
    session::{
        merge::IdentityMergeState, redirect_with_cookies, validated_session_context,
        SessionContext, ValidatedSession,
    },
};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct MergePrompt {
    account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

fn pending_merge(ctx: &RequestContext) -> Result<IdentityMergeState, PassportError> {
    ctx.sessions()
        .merge_state(ctx.headers())
        .ok_or_else(|| PassportError::bad_request("no pending identity merge"))
}

enum MergeAuthorization {
    Allowed(IdentityMergeState, ValidatedSession),
    Redirect(Response),
}

async fn authorize_merge(ctx: &RequestContext) -> Result<MergeAuthorization, PassportError> {
    let merge = pending_merge(ctx)?;

    let session = match validated_session_context(ctx, &merge.params).await? {
        SessionContext::Valid(session) => session,
        SessionContext::Redirect(response) => return Ok(MergeAuthorization::Redirect(response)),
    };

    if session.identity_urn != merge.target {
        warn!(
            "{} tried to confirm a merge into {}",
            session.identity_urn, merge.target
        );
        return Err(PassportError::unauthorized(
            "only the signed-in identity may confirm this merge",
        ));
    }

    Ok(MergeAuthorization::Allowed(merge, session))
}

#[utoipa::path(
    get,
    path = "/merge-identity/prompt",
    responses(
        (status = 200, description = "Account that caused the conflict", body = MergePrompt),
        (status = 400, description = "No pending merge")
    ),
    tag = "merge"
)]
pub async fn prompt(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
) -> Result<Json<MergePrompt>, PassportError> {
    let ctx = RequestContext::new(state.0, headers);
    let merge = pending_merge(&ctx)?;

    Ok(Json(MergePrompt {
        alias: merge.account.alias().map(ToString::to_string),
        account: merge.account.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/merge-identity/confirm",
    responses(
        (status = 200, description = "What the merge would move"),
        (status = 400, description = "No pending merge"),
        (status = 401, description = "Signed-in identity is not the merge target")
    ),
    tag = "merge"
)]
pub async fn preview(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let (merge, session) = match authorize_merge(&ctx).await? {
        MergeAuthorization::Allowed(merge, session) => (merge, session),
        MergeAuthorization::Redirect(response) => return Ok(response),
    };

    let preview: MergePreview = ctx
        .core()
        .merge_preview(&session.jwt, &merge.source, &merge.target)
        .await?;

    Ok(Json(preview).into_response())
}

#[utoipa::path(
    post,
    path = "/merge-identity/confirm",
    responses(
        (status = 303, description = "Merged; back to the pending authorization"),
        (status = 400, description = "No pending merge"),
        (status = 401, description = "Signed-in identity is not the merge target")
    ),
    tag = "merge"
)]
pub async fn confirm(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let (merge, session) = match authorize_merge(&ctx).await? {
        MergeAuthorization::Allowed(merge, session) => (merge, session),
        MergeAuthorization::Redirect(response) => return Ok(response),
    };

    ctx.core()
        .merge_identities(&session.jwt, &merge.source, &merge.target)
        .await?;

    info!("merged {} into {}", merge.source, merge.target);

    let cookies = vec![ctx.sessions().clear_merge_state()?];
    let location = merge.params.authorize_path(Some(RollupResult::Success));
    Ok(redirect_with_cookies(&location, cookies))
}

#[utoipa::path(
    get,
    path = "/merge-identity/cancel",
    responses((status = 303, description = "Merge discarded")),
    tag = "merge"
)]
pub async fn cancel(
    headers: HeaderMap,
    state: Extension<Arc<PassportState>>,
) -> Result<Response, PassportError> {
    let ctx = RequestContext::new(state.0, headers);

    let params = ctx
        .sessions()
        .merge_state(ctx.headers())
        .map_or_else(|| last_params(&ctx), |merge| merge.params);

    let cookies = vec![ctx.sessions().clear_merge_state()?];
    let location = params.authorize_path(Some(RollupResult::Cancel));
    Ok(redirect_with_cookies(&location, cookies))
}
