//! Decides what a verified credential does: sign in, or attach to the
//! signed-in identity.
//!
//! Accounts never move between identities here. A credential owned by
//! another identity only produces a merge challenge that the user has to
//! confirm separately.

use crate::{
    authorize::params::{AuthzParams, RollupResult, PASSPORT_CLIENT_ID},
    core::{AccountResolution, AuthorizeRequest},
    error::PassportError,
    nonce::generate_state,
    passport::state::RequestContext,
    session::{merge::IdentityMergeState, redirect_with_cookies, session_identity},
    token::exchange_token,
    urn::{AccountUrn, IdentityUrn},
};
use axum::response::Response;
use tracing::{info, instrument, warn};

/// How a credential relates to the signed-in identity in a connect flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Unbound credential; attach it to `target`.
    Link { target: IdentityUrn },
    AlreadyConnected,
    /// Bound to `source`, which is not the signed-in `target`.
    LinkedElsewhere {
        source: IdentityUrn,
        target: IdentityUrn,
    },
    NoSession,
}

/// Identity that owned the account before this verification. A binding
/// the core made while verifying is not an owner.
#[must_use]
pub fn prior_owner(resolution: &AccountResolution) -> Option<&IdentityUrn> {
    resolution
        .identity_urn
        .as_ref()
        .filter(|_| resolution.existing)
}

#[must_use]
pub fn classify_link(session: Option<&IdentityUrn>, owner: Option<&IdentityUrn>) -> LinkOutcome {
    match (session, owner) {
        (None, _) => LinkOutcome::NoSession,
        (Some(target), None) => LinkOutcome::Link {
            target: target.clone(),
        },
        (Some(target), Some(owner)) if owner == target => LinkOutcome::AlreadyConnected,
        (Some(target), Some(owner)) => LinkOutcome::LinkedElsewhere {
            source: owner.clone(),
            target: target.clone(),
        },
    }
}

/// Finish a credential verification.
///
/// # Errors
/// Returns the core error, or `Internal` when a login resolves no identity.
#[instrument(skip(ctx, resolution, params), fields(client_id = %params.client_id))]
pub async fn authenticate_account(
    ctx: &RequestContext,
    account: &AccountUrn,
    resolution: AccountResolution,
    params: &AuthzParams,
) -> Result<Response, PassportError> {
    if params.rollup_action.as_ref().is_some_and(|a| a.is_connect()) {
        return connect_account(ctx, account, resolution, params).await;
    }

    let identity = resolution
        .identity_urn
        .ok_or_else(|| PassportError::internal("authenticated account has no identity"))?;

    login(ctx, account, &identity, params).await
}

async fn login(
    ctx: &RequestContext,
    account: &AccountUrn,
    identity: &IdentityUrn,
    params: &AuthzParams,
) -> Result<Response, PassportError> {
    let config = ctx.config();

    let code = ctx
        .core()
        .authorize(&AuthorizeRequest {
            identity: identity.clone(),
            client_id: PASSPORT_CLIENT_ID.to_string(),
            redirect_uri: config.passport_redirect_url(),
            scope: Vec::new(),
            state: generate_state(),
            response_type: "code".to_string(),
            persona_data: None,
        })
        .await?;

    let exchange = exchange_token(
        ctx.core(),
        &code.code,
        PASSPORT_CLIENT_ID,
        config.issuer(),
        account,
    )
    .await?;

    info!("signed in {} with {}", exchange.identity, account);

    ctx.sessions().create_user_session(
        &exchange.tokens.access_token,
        config.issuer(),
        &params.authorize_path(None),
        &params.client_id,
    )
}

async fn connect_account(
    ctx: &RequestContext,
    account: &AccountUrn,
    resolution: AccountResolution,
    params: &AuthzParams,
) -> Result<Response, PassportError> {
    let session = session_identity(ctx, &params.client_id);

    let owner = prior_owner(&resolution);

    let outcome = classify_link(session.as_ref().map(|s| &s.identity_urn), owner);

    let mut cookies = Vec::new();
    let result = match (outcome, session) {
        (LinkOutcome::Link { target }, Some(session)) => {
            ctx.core()
                .link_account(&session.jwt, &target, account)
                .await?;
            info!("connected {} to {}", account, target);
            RollupResult::Success
        }
        (LinkOutcome::AlreadyConnected, _) => RollupResult::AlreadyConnectedError,
        (LinkOutcome::LinkedElsewhere { source, target }, _) => {
            warn!("{} belongs to {}, not {}", account, source, target);
            cookies.push(ctx.sessions().save_merge_state(&IdentityMergeState {
                account: account.clone(),
                source,
                target,
                params: params.clone(),
            })?);
            RollupResult::AccountLinkedError
        }
        (LinkOutcome::NoSession | LinkOutcome::Link { .. }, _) => {
            RollupResult::AccountConnectError
        }
    };

    Ok(redirect_with_cookies(
        &params.authorize_path(Some(result)),
        cookies,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(id: &str) -> IdentityUrn {
        IdentityUrn::from_id(id)
    }

    #[test]
    fn classification() {
        let a = urn("a");
        let b = urn("b");
        assert_eq!(classify_link(None, Some(&a)), LinkOutcome::NoSession);
        assert_eq!(classify_link(None, None), LinkOutcome::NoSession);
        assert_eq!(
            classify_link(Some(&a), None),
            LinkOutcome::Link { target: a.clone() }
        );
        assert_eq!(classify_link(Some(&a), Some(&a)), LinkOutcome::AlreadyConnected);
        assert_eq!(
            classify_link(Some(&a), Some(&b)),
            LinkOutcome::LinkedElsewhere {
                source: b,
                target: a
            }
        );
    }

    #[test]
    fn fresh_bindings_have_no_prior_owner() {
        let a = urn("a");
        let fresh = AccountResolution {
            identity_urn: Some(a.clone()),
            existing: false,
        };
        assert_eq!(prior_owner(&fresh), None);
        assert_eq!(
            classify_link(Some(&a), prior_owner(&fresh)),
            LinkOutcome::Link { target: a.clone() }
        );

        let bound = AccountResolution {
            identity_urn: Some(urn("b")),
            existing: true,
        };
        assert_eq!(prior_owner(&bound), Some(&urn("b")));
    }
}
