use crate::authorize::params::is_first_party;
use serde::{Deserialize, Serialize};

pub const USER_SESSION_COOKIE: &str = "_rollup_session";
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 7_776_000;

pub const AUTHZ_COOKIE_PREFIX: &str = "_rollup_client_params_";
pub const AUTHZ_LAST: &str = "last";
pub const AUTHZ_MAX_AGE: u64 = 34_560_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub issuer: String,
    pub jwt: String,
}

/// First-party clients share the base session; relying parties share `_last`.
#[must_use]
pub fn user_session_cookie_name(client_id: &str) -> String {
    if is_first_party(client_id) {
        USER_SESSION_COOKIE.to_string()
    } else {
        format!("{USER_SESSION_COOKIE}_last")
    }
}

#[must_use]
pub fn authz_cookie_name(client_id: &str) -> String {
    format!("{AUTHZ_COOKIE_PREFIX}{client_id}")
}
