use crate::{
    authorize::params::AuthzParams,
    urn::{AccountUrn, IdentityUrn},
};
use serde::{Deserialize, Serialize};

pub const MERGE_COOKIE: &str = "_rollup_identity_merge";

/// Pending merge: `source` owns `account`, `target` is the signed-in identity.
/// `params` is the connect request that hit the conflict; its client scopes
/// the session the merge runs under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMergeState {
    pub account: AccountUrn,
    pub source: IdentityUrn,
    pub target: IdentityUrn,
    pub params: AuthzParams,
}
