//! Boundary to the core identity service.
//!
//! Every read and write of identity state goes through `CoreClient`; this
//! crate never persists identities, accounts, grants or nonces itself.

pub mod http;
pub mod memory;
pub mod types;

use crate::urn::{AccountUrn, IdentityUrn};
use async_trait::async_trait;
use thiserror::Error;

pub use types::*;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("core request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid core endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("core returned {status}: {message}")]
    Rpc { status: u16, message: String },

    #[error("unexpected core response: {0}")]
    Decode(String),
}

impl CoreError {
    pub fn rpc(status: u16, message: impl Into<String>) -> Self {
        Self::Rpc {
            status,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CoreClient: Send + Sync {
    async fn get_app_public_props(&self, client_id: &str) -> Result<AppPublicProps, CoreError>;

    async fn get_scopes(&self) -> Result<ScopeMeta, CoreError>;

    /// Issue a code without consent when an existing grant covers the scope.
    async fn preauthorize(&self, request: &AuthorizeRequest)
        -> Result<Preauthorization, CoreError>;

    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizationCode, CoreError>;

    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenSet, CoreError>;

    async fn get_profile(&self, identity: &IdentityUrn) -> Result<Option<Profile>, CoreError>;

    async fn set_profile(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        profile: &Profile,
    ) -> Result<(), CoreError>;

    /// Register a sign-in challenge and return the nonce.
    async fn get_nonce(&self, request: &NonceRequest) -> Result<String, CoreError>;

    /// Consume a nonce, check the signature and resolve the account binding.
    async fn verify_nonce(&self, request: &NonceVerifyRequest)
        -> Result<AccountResolution, CoreError>;

    /// Mail a one-time code to an email account; returns the verification state.
    async fn generate_email_otp(&self, request: &EmailOtpRequest) -> Result<String, CoreError>;

    /// Check a one-time code and resolve the account binding.
    async fn verify_email_otp(
        &self,
        request: &EmailOtpVerifyRequest,
    ) -> Result<AccountResolution, CoreError>;

    async fn link_account(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        account: &AccountUrn,
    ) -> Result<(), CoreError>;

    async fn get_identity_accounts(
        &self,
        identity: &IdentityUrn,
    ) -> Result<Vec<AccountProfile>, CoreError>;

    async fn get_account_profile(&self, account: &AccountUrn) -> Result<AccountProfile, CoreError>;

    async fn get_persona_data(
        &self,
        identity: &IdentityUrn,
        client_id: &str,
    ) -> Result<Option<PersonaData>, CoreError>;

    async fn init_smart_contract_wallet(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        nickname: &str,
    ) -> Result<AccountUrn, CoreError>;

    /// Whether the session token still refers to a valid identity.
    async fn is_account_valid(&self, jwt: &str) -> Result<bool, CoreError>;

    async fn merge_preview(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<MergePreview, CoreError>;

    async fn merge_identities(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<(), CoreError>;
}
