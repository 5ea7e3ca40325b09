//! Shared server state, configuration and the per-request context.

use crate::{
    core::CoreClient,
    session::{codec::CookieCodec, user::DEFAULT_SESSION_TTL_SECONDS, Sessions},
};
use axum::http::HeaderMap;
use secrecy::SecretString;
use std::{fmt, sync::Arc};

pub const DEFAULT_MERGE_TTL_SECONDS: u64 = 5 * 60;

#[derive(Clone)]
pub struct PassportConfig {
    passport_url: String,
    console_url: String,
    session_secret: SecretString,
    cookie_domain: Option<String>,
    session_ttl_seconds: u64,
    merge_ttl_seconds: u64,
}

impl fmt::Debug for PassportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassportConfig")
            .field("passport_url", &self.passport_url)
            .field("console_url", &self.console_url)
            .field("cookie_domain", &self.cookie_domain)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("merge_ttl_seconds", &self.merge_ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl PassportConfig {
    #[must_use]
    pub fn new(passport_url: &str, console_url: &str, session_secret: SecretString) -> Self {
        Self {
            passport_url: passport_url.trim_end_matches('/').to_string(),
            console_url: console_url.trim_end_matches('/').to_string(),
            session_secret,
            cookie_domain: None,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            merge_ttl_seconds: DEFAULT_MERGE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_merge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.merge_ttl_seconds = seconds;
        self
    }

    /// Token issuer, also the public base URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.passport_url
    }

    /// Where first-party passport logins land.
    #[must_use]
    pub fn passport_redirect_url(&self) -> String {
        format!("{}/settings", self.passport_url)
    }

    #[must_use]
    pub fn console_url(&self) -> &str {
        &self.console_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn merge_ttl_seconds(&self) -> u64 {
        self.merge_ttl_seconds
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.passport_url.starts_with("https://")
    }

    fn sessions(&self) -> Sessions {
        let codec = CookieCodec::new(
            self.session_secret.clone(),
            self.session_cookie_secure(),
            self.cookie_domain.clone(),
        );
        Sessions::new(codec, self.session_ttl_seconds, self.merge_ttl_seconds)
    }
}

pub struct PassportState {
    config: PassportConfig,
    core: Arc<dyn CoreClient>,
    sessions: Sessions,
}

impl PassportState {
    #[must_use]
    pub fn new(config: PassportConfig, core: Arc<dyn CoreClient>) -> Self {
        let sessions = config.sessions();
        Self {
            config,
            core,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PassportConfig {
        &self.config
    }

    #[must_use]
    pub fn core(&self) -> &dyn CoreClient {
        self.core.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}

/// Everything a flow needs about the current request.
#[derive(Clone)]
pub struct RequestContext {
    state: Arc<PassportState>,
    headers: HeaderMap,
}

impl RequestContext {
    #[must_use]
    pub fn new(state: Arc<PassportState>, headers: HeaderMap) -> Self {
        Self { state, headers }
    }

    #[must_use]
    pub fn config(&self) -> &PassportConfig {
        self.state.config()
    }

    #[must_use]
    pub fn core(&self) -> &dyn CoreClient {
        self.state.core()
    }

    #[must_use]
    pub fn sessions(&self) -> &Sessions {
        self.state.sessions()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}
