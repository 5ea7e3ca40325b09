//! Structural checks on session access tokens.
//!
//! Signatures are not verified here; the core checks them when it is asked
//! whether the account behind a token is still valid.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub iss: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("missing session token")]
    Missing,

    #[error("invalid session token")]
    Invalid,

    #[error("session token expired")]
    Expired,
}

/// Decode a token and check its expiry.
///
/// # Errors
/// `Missing` for an empty token, `Expired` past `exp`, `Invalid` otherwise.
pub fn check_token(jwt: &str) -> Result<SessionClaims, TokenError> {
    if jwt.trim().is_empty() {
        return Err(TokenError::Missing);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<SessionClaims>(jwt, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}
