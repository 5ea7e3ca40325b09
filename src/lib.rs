//! # Passport (Authorization & Identity Linking)
//!
//! `passport` is the user-facing half of an OAuth2/OIDC authorization server.
//! Identities are aggregates of linked accounts (wallets, email addresses and
//! social logins); the identity core owns that graph and mints tokens, while
//! passport runs the browser flows in front of it.
//!
//! ## Flows
//!
//! - **Authorization:** `GET /authorize` validates the client request, resumes
//!   it across redirects through signed cookies, short-circuits when a prior
//!   consent covers the request, and otherwise returns the consent data.
//!   `POST /authorize` records the decision and redirects back with a code.
//! - **Wallet sign-in:** a nonce challenge is issued for an address, the signed
//!   message is verified by the core, and the account is either logged in or
//!   linked to the current identity.
//! - **Email sign-in:** the core mails a one-time code; the code comes back
//!   with the verification state and ends the same way as a wallet signature.
//! - **Identity merge:** connecting an account that already belongs to another
//!   identity parks a merge request that the signed-in user may confirm.
//!
//! ## Sessions
//!
//! Every piece of browser state (user session, pending authorization
//! parameters, flash notices, merge requests) travels as an HMAC-signed
//! cookie. Tampered or expired cookies read as absent.

pub mod authorize;
pub mod cli;
pub mod core;
pub mod email;
pub mod error;
pub mod linker;
pub mod nonce;
pub mod passport;
pub mod persona;
pub mod session;
pub mod token;
pub mod urn;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
