//! Signed cookie codec.
//!
//! Cookie values are `base64url(json{exp,data}).base64url(hmac)`; the MAC
//! covers the cookie name as well as the payload, so a value sealed for one
//! scope never opens under another.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Name and lifetime of one cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieScope {
    pub name: String,
    pub max_age: u64,
}

impl CookieScope {
    pub fn new(name: impl Into<String>, max_age: u64) -> Self {
        Self {
            name: name.into(),
            max_age,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    exp: u64,
    data: T,
}

#[derive(Clone)]
pub struct CookieCodec {
    secret: SecretString,
    secure: bool,
    domain: Option<String>,
}

impl CookieCodec {
    #[must_use]
    pub fn new(secret: SecretString, secure: bool, domain: Option<String>) -> Self {
        Self {
            secret,
            secure,
            domain,
        }
    }

    /// Build a `Set-Cookie` value holding `value` for `scope.max_age` seconds.
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized or the cookie is not
    /// a valid header value.
    pub fn seal<T: Serialize>(&self, scope: &CookieScope, value: &T) -> Result<HeaderValue, CodecError> {
        let envelope = Envelope {
            exp: unix_now() + scope.max_age,
            data: value,
        };
        let payload = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&envelope)?);
        let signature = Base64UrlUnpadded::encode_string(&self.sign(&scope.name, &payload)?);
        Ok(self.set_cookie(scope, &format!("{payload}.{signature}"), scope.max_age)?)
    }

    /// Read a cookie sealed for `scope`.
    ///
    /// Missing, expired, malformed and tampered cookies all read as `None`.
    #[must_use]
    pub fn open<T: DeserializeOwned>(&self, scope: &CookieScope, headers: &HeaderMap) -> Option<T> {
        let raw = cookie_value(headers, &scope.name)?;
        let (payload, signature) = raw.split_once('.')?;

        let signature = Base64UrlUnpadded::decode_vec(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(scope.name.as_bytes());
        mac.update(b"=");
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            warn!("Rejected tampered cookie: {}", scope.name);
            return None;
        }

        let json = Base64UrlUnpadded::decode_vec(payload).ok()?;
        let envelope: Envelope<T> = serde_json::from_slice(&json).ok()?;

        (envelope.exp > unix_now()).then_some(envelope.data)
    }

    /// Build a `Set-Cookie` value that removes the cookie.
    ///
    /// # Errors
    /// Returns an error if the cookie is not a valid header value.
    pub fn expire(&self, scope: &CookieScope) -> Result<HeaderValue, CodecError> {
        Ok(self.set_cookie(scope, "", 0)?)
    }

    fn mac(&self) -> Result<HmacSha256, CodecError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| CodecError::Key)
    }

    fn sign(&self, name: &str, payload: &str) -> Result<Vec<u8>, CodecError> {
        let mut mac = self.mac()?;
        mac.update(name.as_bytes());
        mac.update(b"=");
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn set_cookie(
        &self,
        scope: &CookieScope,
        value: &str,
        max_age: u64,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}",
            scope.name
        );
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to serialize cookie: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid cookie header: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("invalid cookie key")]
    Key,
}

/// Find a cookie by name across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find_map(|(key, value)| (key.trim() == name).then(|| value.trim().to_string()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
