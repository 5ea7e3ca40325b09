use super::{flash::FlashMessage, redirect_with_cookies, token::check_token, token::TokenError};
use crate::{
    authorize::params::AuthzParams, error::PassportError, passport::state::RequestContext,
    urn::IdentityUrn,
};
use axum::response::Response;
use tracing::{debug, info};

/// Session that passed both the structural and the core validity check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedSession {
    pub jwt: String,
    pub identity_urn: IdentityUrn,
}

pub enum SessionContext {
    Valid(ValidatedSession),
    /// The caller must return this response as is.
    Redirect(Response),
}

/// Save the pending params and send the user to sign in.
///
/// # Errors
/// Returns an error if the cookies cannot be built.
pub fn authenticate_redirect(
    ctx: &RequestContext,
    params: &AuthzParams,
) -> Result<Response, PassportError> {
    let connect = params.rollup_action.as_ref().is_some_and(|a| a.is_connect());

    let mut location = format!(
        "/authenticate/{}{}",
        params.client_id,
        if connect { "" } else { "/account" }
    );

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if params.prompt.is_some() {
        query.append_pair("prompt", "consent");
    }
    if let Some(hint) = &params.login_hint {
        query.append_pair("login_hint", hint);
    }
    if let Some(action) = &params.rollup_action {
        query.append_pair("rollup_action", &action.to_string());
    }
    let query = query.finish();
    if !query.is_empty() {
        location.push('?');
        location.push_str(&query);
    }

    let cookies = ctx.sessions().save_authz_params(params)?;
    Ok(redirect_with_cookies(&location, cookies))
}

/// Resolve the session for `params.client_id`.
///
/// A missing or malformed token restarts authentication; an expired token or
/// an identity the core no longer accepts ends the session.
///
/// # Errors
/// Returns an error when the core cannot be reached or cookies cannot be built.
pub async fn validated_session_context(
    ctx: &RequestContext,
    params: &AuthzParams,
) -> Result<SessionContext, PassportError> {
    let jwt = ctx
        .sessions()
        .user_session(ctx.headers(), &params.client_id)
        .map(|session| session.jwt)
        .unwrap_or_default();

    let claims = match check_token(&jwt) {
        Ok(claims) => claims,
        Err(TokenError::Missing | TokenError::Invalid) => {
            debug!("no usable session for client {}", params.client_id);
            return authenticate_redirect(ctx, params).map(SessionContext::Redirect);
        }
        Err(TokenError::Expired) => {
            info!("session expired for client {}", params.client_id);
            return sign_out(ctx, &params.client_id).map(SessionContext::Redirect);
        }
    };

    let Ok(identity_urn) = IdentityUrn::parse(&claims.sub) else {
        info!("session subject is not an identity: {}", claims.sub);
        return sign_out(ctx, &params.client_id).map(SessionContext::Redirect);
    };

    if !ctx.core().is_account_valid(&jwt).await? {
        info!("core rejected session for {}", identity_urn);
        return sign_out(ctx, &params.client_id).map(SessionContext::Redirect);
    }

    Ok(SessionContext::Valid(ValidatedSession { jwt, identity_urn }))
}

/// Identity of a structurally valid session, without asking the core.
#[must_use]
pub fn session_identity(ctx: &RequestContext, client_id: &str) -> Option<ValidatedSession> {
    let session = ctx.sessions().user_session(ctx.headers(), client_id)?;
    let claims = check_token(&session.jwt).ok()?;
    let identity_urn = IdentityUrn::parse(&claims.sub).ok()?;
    Some(ValidatedSession {
        jwt: session.jwt,
        identity_urn,
    })
}

fn sign_out(ctx: &RequestContext, client_id: &str) -> Result<Response, PassportError> {
    ctx.sessions().destroy_user_session(
        &format!("/authenticate/{client_id}"),
        Some(FlashMessage::Signout),
        client_id,
    )
}
