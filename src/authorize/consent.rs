//! Data handed to the consent screen.

use super::params::{AuthzParams, RollupAction, RollupResult};
use crate::{
    core::{AppPublicProps, PersonaData, Profile, ScopeMeta},
    persona::{DataForScopes, ResolvedClaims, ERC_4337_SCOPE},
};
use serde::Serialize;
use utoipa::ToSchema;

/// Form field that asks for a new smart contract wallet on submit.
pub const CREATE_WALLET_FIELD: &str = "createSCWallet";

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsentData {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub requested_scope: Vec<String>,
    #[schema(value_type = Object)]
    pub app: AppPublicProps,
    #[schema(value_type = Object)]
    pub scope_meta: ScopeMeta,
    #[schema(value_type = Object)]
    pub profile: Profile,
    #[schema(value_type = Object)]
    pub candidates: DataForScopes,
    #[schema(value_type = Option<Object>)]
    pub persona_data: Option<PersonaData>,
    #[schema(value_type = Object)]
    pub selected: ResolvedClaims,
    pub disable_authorize: bool,
    /// Re-enters `/authorize` with `rollup_action=addaccount`, which comes
    /// back here once the account is connected.
    pub add_new_account_url: String,
    /// Outcome of the add-account round trip that led back here.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub connect_result: Option<RollupResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_new_wallet_field: Option<String>,
}

pub struct ConsentInput {
    pub params: AuthzParams,
    pub app: AppPublicProps,
    pub scope_meta: ScopeMeta,
    pub profile: Profile,
    pub candidates: DataForScopes,
    pub selected: ResolvedClaims,
    pub connect_result: Option<RollupResult>,
}

impl ConsentData {
    #[must_use]
    pub fn build(input: ConsentInput) -> Self {
        let ConsentInput {
            params,
            app,
            scope_meta,
            profile,
            candidates,
            selected,
            connect_result,
        } = input;

        let connect = AuthzParams {
            rollup_action: Some(RollupAction::AddAccount),
            prompt: None,
            ..params.clone()
        };

        let wants_wallet = params.scope.iter().any(|s| s == ERC_4337_SCOPE);

        Self {
            disable_authorize: candidates.disable_authorize(&params.scope),
            scope_meta: scope_meta.restricted_to(&params.scope),
            persona_data: candidates.persona_data.clone(),
            add_new_account_url: connect.authorize_path(None),
            add_new_wallet_field: wants_wallet.then(|| CREATE_WALLET_FIELD.to_string()),
            connect_result,
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            state: params.state,
            requested_scope: params.scope,
            app,
            profile,
            candidates,
            selected,
        }
    }
}
