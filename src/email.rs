//! Email one-time code sign-in.
//!
//! The core mails the code and keeps the pending verification; passport only
//! shapes the account identifier and carries the verification state between
//! the two requests.

use crate::{
    core::{AccountResolution, CoreClient, EmailOtpRequest, EmailOtpVerifyRequest},
    error::PassportError,
    urn::AccountUrn,
};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[must_use]
pub fn is_valid_email(address: &str) -> bool {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").is_ok_and(|re| re.is_match(address))
}

/// Account URN for an email address; the id is `sha256("email/<address>")`.
#[must_use]
pub fn email_account_urn(address: &str) -> AccountUrn {
    let address = address.trim().to_lowercase();
    let digest = Sha256::digest(format!("email/{address}").as_bytes());
    let id = digest.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    });
    AccountUrn::componentized(&id, "email", "email", &address)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct EmailChallenge {
    pub address: String,
    /// Echo back with the code.
    pub state: String,
}

/// Ask the core to mail a code to `address`.
///
/// # Errors
/// Returns `BadRequest` for a malformed address, or the core error.
#[instrument(skip(core))]
pub async fn issue_email_code(
    core: &dyn CoreClient,
    address: &str,
) -> Result<EmailChallenge, PassportError> {
    let address = address.trim().to_lowercase();
    if !is_valid_email(&address) {
        return Err(PassportError::bad_request(format!("invalid email address: {address}")));
    }

    let state = core
        .generate_email_otp(&EmailOtpRequest {
            account: email_account_urn(&address),
            address: address.clone(),
        })
        .await?;

    debug!("sent sign-in code to {}", address);

    Ok(EmailChallenge { address, state })
}

/// Check `code` and resolve which identity the email account belongs to.
///
/// # Errors
/// Returns `BadRequest` for a malformed address or empty code/state, or the
/// core error.
#[instrument(skip(core, code, state, prior_session_jwt))]
pub async fn verify_email_code(
    core: &dyn CoreClient,
    address: &str,
    code: &str,
    state: &str,
    prior_session_jwt: Option<&str>,
    force_account_creation: bool,
) -> Result<(AccountUrn, AccountResolution), PassportError> {
    if !is_valid_email(address.trim()) {
        return Err(PassportError::bad_request(format!("invalid email address: {address}")));
    }
    if code.trim().is_empty() || state.trim().is_empty() {
        return Err(PassportError::bad_request("code and state are required"));
    }

    let account = email_account_urn(address);
    let resolution = core
        .verify_email_otp(&EmailOtpVerifyRequest {
            account: account.clone(),
            code: code.trim().to_string(),
            state: state.to_string(),
            jwt: prior_session_jwt.map(ToString::to_string),
            force_account_creation,
        })
        .await?;

    debug!(
        "email code verified for {}, existing: {}",
        account, resolution.existing
    );

    Ok((account, resolution))
}
