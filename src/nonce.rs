//! Wallet sign-in challenges.
//!
//! Nonces are minted and consumed by the core service; this module owns the
//! message template, the wallet account identifier and the account creation
//! policy.

use crate::{
    authorize::params::RollupAction,
    core::{AccountResolution, AppPublicProps, CoreClient, NonceRequest, NonceVerifyRequest},
    error::PassportError,
    urn::AccountUrn,
};
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use tracing::{debug, instrument};
use utoipa::ToSchema;

pub const NONCE_PLACEHOLDER: &str = "{{nonce}}";

pub const DEFAULT_SIGN_MESSAGE_TEMPLATE: &str = "Welcome to Rollup!\n\
Sign this message to accept the Rollup Terms of Service (https://rollup.id/tos), no password needed!\n\
This will not trigger a blockchain transaction or cost any gas fees.\n\
{{nonce}}\n";

#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").is_ok_and(|re| re.is_match(address))
}

/// Account URN for an Ethereum address; the id is `sha256("eth/<address>")`.
#[must_use]
pub fn wallet_account_urn(address: &str) -> AccountUrn {
    let address = address.to_lowercase();
    let digest = Sha256::digest(format!("eth/{address}").as_bytes());
    let id = digest.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    });
    AccountUrn::componentized(&id, "crypto", "eth", &address)
}

/// The app's own template when it carries the placeholder, otherwise the default.
#[must_use]
pub fn sign_message_template(app: Option<&AppPublicProps>) -> &str {
    app.and_then(|app| app.custom_sign_message.as_deref())
        .filter(|template| template.contains(NONCE_PLACEHOLDER))
        .unwrap_or(DEFAULT_SIGN_MESSAGE_TEMPLATE)
}

/// Only connect actions that expect an existing identity may not mint a new one.
#[must_use]
pub fn force_account_creation(action: Option<&RollupAction>) -> bool {
    !matches!(
        action,
        Some(RollupAction::Connect | RollupAction::GroupConnect(_) | RollupAction::AddAccount)
    )
}

#[must_use]
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct NonceChallenge {
    pub nonce: String,
    pub state: String,
    pub address: String,
    /// Message the wallet must sign.
    pub message: String,
}

/// Register a challenge for `address` with the core.
///
/// # Errors
/// Returns `BadRequest` for a malformed address or a template without the
/// nonce placeholder, or the core error.
#[instrument(skip(core, template))]
pub async fn issue_nonce(
    core: &dyn CoreClient,
    address: &str,
    template: &str,
    state: &str,
    scope: &[String],
    redirect_uri: &str,
) -> Result<NonceChallenge, PassportError> {
    if !is_valid_address(address) {
        return Err(PassportError::bad_request(format!("invalid address: {address}")));
    }
    if !template.contains(NONCE_PLACEHOLDER) {
        return Err(PassportError::bad_request(
            "sign message template is missing the nonce placeholder",
        ));
    }

    let nonce = core
        .get_nonce(&NonceRequest {
            address: address.to_string(),
            template: template.to_string(),
            state: state.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_vec(),
        })
        .await?;

    debug!("issued nonce for {}", address);

    Ok(NonceChallenge {
        message: template.replace(NONCE_PLACEHOLDER, &nonce),
        nonce,
        state: state.to_string(),
        address: address.to_string(),
    })
}

/// Consume `nonce` and resolve which identity `account` belongs to.
///
/// # Errors
/// Returns `BadRequest` when nonce or signature are empty, or the core error.
#[instrument(skip(core, signature, prior_session_jwt))]
pub async fn verify_nonce(
    core: &dyn CoreClient,
    account: &AccountUrn,
    nonce: &str,
    signature: &str,
    prior_session_jwt: Option<&str>,
    force_account_creation: bool,
) -> Result<AccountResolution, PassportError> {
    if nonce.trim().is_empty() || signature.trim().is_empty() {
        return Err(PassportError::bad_request("nonce and signature are required"));
    }

    let resolution = core
        .verify_nonce(&NonceVerifyRequest {
            account: account.clone(),
            nonce: nonce.to_string(),
            signature: signature.to_string(),
            jwt: prior_session_jwt.map(ToString::to_string),
            force_account_creation,
        })
        .await?;

    debug!(
        "nonce verified for {}, existing: {}",
        account, resolution.existing
    );

    Ok(resolution)
}
