pub mod authenticate;
pub mod authorize;
pub mod email;
pub mod health;
pub mod merge;
pub mod signout;

use crate::{authorize::params::AuthzParams, passport::state::RequestContext};

/// Pending params for `client_id`; without any, start over as a passport login.
pub(crate) fn pending_params(ctx: &RequestContext, client_id: &str) -> AuthzParams {
    let sessions = ctx.sessions();
    sessions
        .authz_params(ctx.headers(), Some(client_id))
        .or_else(|| {
            sessions
                .authz_params(ctx.headers(), None)
                .filter(|params| params.client_id == client_id)
        })
        .unwrap_or_else(|| AuthzParams::passport_default(&ctx.config().passport_redirect_url()))
}

/// Most recent pending params of any client.
pub(crate) fn last_params(ctx: &RequestContext) -> AuthzParams {
    ctx.sessions()
        .authz_params(ctx.headers(), None)
        .unwrap_or_else(|| AuthzParams::passport_default(&ctx.config().passport_redirect_url()))
}
