//! Cookie-backed session state: user sessions, pending authorization
//! params, flash notices and pending identity merges.

pub mod codec;
pub mod flash;
pub mod merge;
pub mod token;
pub mod user;
pub mod validated;

use crate::{authorize::params::AuthzParams, error::PassportError};
use axum::{
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};
use codec::{CookieCodec, CookieScope};
use flash::{FlashMessage, FLASH_COOKIE, FLASH_MAX_AGE};
use merge::{IdentityMergeState, MERGE_COOKIE};
use tracing::debug;
use user::{authz_cookie_name, user_session_cookie_name, UserSession, AUTHZ_LAST, AUTHZ_MAX_AGE};

pub use validated::{
    authenticate_redirect, session_identity, validated_session_context, SessionContext,
    ValidatedSession,
};

/// Redirect with `Set-Cookie` headers attached.
#[must_use]
pub fn redirect_with_cookies(location: &str, cookies: Vec<HeaderValue>) -> Response {
    let mut response = Redirect::to(location).into_response();
    append_cookies(&mut response, cookies);
    response
}

pub fn append_cookies(response: &mut Response, cookies: Vec<HeaderValue>) {
    let headers = response.headers_mut();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
}

#[derive(Clone)]
pub struct Sessions {
    codec: CookieCodec,
    session_ttl: u64,
    merge_ttl: u64,
}

impl Sessions {
    #[must_use]
    pub fn new(codec: CookieCodec, session_ttl: u64, merge_ttl: u64) -> Self {
        Self {
            codec,
            session_ttl,
            merge_ttl,
        }
    }

    fn user_scope(&self, client_id: &str) -> CookieScope {
        CookieScope::new(user_session_cookie_name(client_id), self.session_ttl)
    }

    #[must_use]
    pub fn user_session(&self, headers: &HeaderMap, client_id: &str) -> Option<UserSession> {
        self.codec.open(&self.user_scope(client_id), headers)
    }

    /// Store `jwt` for the client's session scope and redirect.
    ///
    /// # Errors
    /// Returns an error if the cookie cannot be built.
    pub fn create_user_session(
        &self,
        jwt: &str,
        issuer: &str,
        redirect_to: &str,
        client_id: &str,
    ) -> Result<Response, PassportError> {
        let session = UserSession {
            issuer: issuer.to_string(),
            jwt: jwt.to_string(),
        };
        let cookie = self.codec.seal(&self.user_scope(client_id), &session)?;
        debug!("created user session for client {}", client_id);
        Ok(redirect_with_cookies(redirect_to, vec![cookie]))
    }

    /// Drop the client's session, optionally leaving a flash notice.
    ///
    /// # Errors
    /// Returns an error if the cookies cannot be built.
    pub fn destroy_user_session(
        &self,
        redirect_to: &str,
        flash: Option<FlashMessage>,
        client_id: &str,
    ) -> Result<Response, PassportError> {
        let mut cookies = vec![self.codec.expire(&self.user_scope(client_id))?];
        if let Some(message) = flash {
            cookies.push(self.flash(message)?);
        }
        debug!("destroyed user session for client {}", client_id);
        Ok(redirect_with_cookies(redirect_to, cookies))
    }

    fn authz_scope(client_id: &str) -> CookieScope {
        CookieScope::new(authz_cookie_name(client_id), AUTHZ_MAX_AGE)
    }

    /// Pending params for `client_id`, or the most recent ones when `None`.
    #[must_use]
    pub fn authz_params(&self, headers: &HeaderMap, client_id: Option<&str>) -> Option<AuthzParams> {
        let scope = Self::authz_scope(client_id.unwrap_or(AUTHZ_LAST));
        self.codec.open(&scope, headers)
    }

    /// Cookies persisting `params` under the client and `last` scopes.
    ///
    /// # Errors
    /// Returns an error if the cookies cannot be built.
    pub fn save_authz_params(&self, params: &AuthzParams) -> Result<Vec<HeaderValue>, PassportError> {
        Ok(vec![
            self.codec.seal(&Self::authz_scope(&params.client_id), params)?,
            self.codec.seal(&Self::authz_scope(AUTHZ_LAST), params)?,
        ])
    }

    /// # Errors
    /// Returns an error if the cookies cannot be built.
    pub fn clear_authz_params(&self, client_id: &str) -> Result<Vec<HeaderValue>, PassportError> {
        Ok(vec![
            self.codec.expire(&Self::authz_scope(client_id))?,
            self.codec.expire(&Self::authz_scope(AUTHZ_LAST))?,
        ])
    }

    fn flash_scope() -> CookieScope {
        CookieScope::new(FLASH_COOKIE, FLASH_MAX_AGE)
    }

    /// # Errors
    /// Returns an error if the cookie cannot be built.
    pub fn flash(&self, message: FlashMessage) -> Result<HeaderValue, PassportError> {
        Ok(self.codec.seal(&Self::flash_scope(), &message)?)
    }

    /// Read the flash notice and the cookie that consumes it.
    ///
    /// # Errors
    /// Returns an error if the clearing cookie cannot be built.
    pub fn take_flash(
        &self,
        headers: &HeaderMap,
    ) -> Result<(Option<FlashMessage>, HeaderValue), PassportError> {
        let scope = Self::flash_scope();
        Ok((self.codec.open(&scope, headers), self.codec.expire(&scope)?))
    }

    fn merge_scope(&self) -> CookieScope {
        CookieScope::new(MERGE_COOKIE, self.merge_ttl)
    }

    /// # Errors
    /// Returns an error if the cookie cannot be built.
    pub fn save_merge_state(&self, state: &IdentityMergeState) -> Result<HeaderValue, PassportError> {
        Ok(self.codec.seal(&self.merge_scope(), state)?)
    }

    #[must_use]
    pub fn merge_state(&self, headers: &HeaderMap) -> Option<IdentityMergeState> {
        self.codec.open(&self.merge_scope(), headers)
    }

    /// # Errors
    /// Returns an error if the cookie cannot be built.
    pub fn clear_merge_state(&self) -> Result<HeaderValue, PassportError> {
        Ok(self.codec.expire(&self.merge_scope())?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::{header::COOKIE, header::LOCATION, StatusCode};
    use secrecy::SecretString;

    pub(crate) fn sessions() -> Sessions {
        let codec = CookieCodec::new(
            SecretString::from("test-secret-test-secret-test-secret".to_string()),
            false,
            None,
        );
        Sessions::new(codec, 3600, 300)
    }

    /// Turn `Set-Cookie` values into a request `Cookie` header.
    pub(crate) fn cookie_header(set_cookies: &[HeaderValue]) -> HeaderMap {
        let pairs: Vec<String> = set_cookies
            .iter()
            .filter_map(|c| c.to_str().ok())
            .filter_map(|c| c.split(';').next())
            .map(ToString::to_string)
            .collect();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pairs.join("; ")).unwrap());
        headers
    }

    fn set_cookies(response: &Response) -> Vec<HeaderValue> {
        response.headers().get_all(SET_COOKIE).iter().cloned().collect()
    }

    #[test]
    fn user_session_scoped_per_client_class() {
        let sessions = sessions();
        let response = sessions
            .create_user_session("jwt-1", "https://passport.test", "/authorize?x=1", "app")
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/authorize?x=1");

        let headers = cookie_header(&set_cookies(&response));
        let session = sessions.user_session(&headers, "other-app").unwrap();
        assert_eq!(session.jwt, "jwt-1");
        assert!(sessions.user_session(&headers, "passport").is_none());
    }

    #[test]
    fn destroy_sets_flash() {
        let sessions = sessions();
        let response = sessions
            .destroy_user_session("/authenticate/app", Some(FlashMessage::Signout), "app")
            .unwrap();
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].to_str().unwrap().starts_with("_rollup_session_last=; "));

        let headers = cookie_header(&cookies);
        let (flash, clear) = sessions.take_flash(&headers).unwrap();
        assert_eq!(flash, Some(FlashMessage::Signout));
        assert!(clear.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn authz_params_written_for_client_and_last() {
        let sessions = sessions();
        let params = AuthzParams {
            scope: vec!["openid".to_string()],
            client_id: "app".to_string(),
            ..AuthzParams::passport_default("https://app.example/cb")
        };
        let cookies = sessions.save_authz_params(&params).unwrap();
        let headers = cookie_header(&cookies);
        assert_eq!(sessions.authz_params(&headers, Some("app")), Some(params.clone()));
        assert_eq!(sessions.authz_params(&headers, None), Some(params));
        assert_eq!(sessions.authz_params(&headers, Some("other")), None);
    }
}
