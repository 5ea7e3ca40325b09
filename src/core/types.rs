//! Payloads exchanged with the core service.

use crate::urn::{AccountUrn, IdentityUrn};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Eth,
    /// Smart contract wallet.
    Wallet,
    Email,
    Mask,
    Google,
    Microsoft,
    Apple,
    Github,
    Twitter,
    Discord,
    Webauthn,
}

impl AccountType {
    /// Accounts that can back the `email` claim.
    #[must_use]
    pub const fn is_email_compatible(self) -> bool {
        matches!(
            self,
            Self::Email | Self::Mask | Self::Google | Self::Microsoft | Self::Apple
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub urn: AccountUrn,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// Wallet address, email address or provider handle.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub picture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_account_urn: Option<AccountUrn>,
}

/// Selection for a multi-valued claim: explicit accounts, or every
/// qualifying account at read time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimSelection {
    All,
    Accounts(Vec<AccountUrn>),
}

const ALL_SENTINEL: &str = "ALL";

impl ClaimSelection {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Accounts(accounts) if accounts.is_empty())
    }
}

impl Serialize for ClaimSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL_SENTINEL),
            Self::Accounts(accounts) => accounts.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClaimSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Sentinel(String),
            Accounts(Vec<AccountUrn>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Sentinel(value) if value == ALL_SENTINEL => Ok(Self::All),
            Raw::Sentinel(value) => Err(de::Error::custom(format!(
                "expected \"{ALL_SENTINEL}\" or a list of accounts, got \"{value}\""
            ))),
            Raw::Accounts(accounts) => Ok(Self::Accounts(accounts)),
        }
    }
}

/// Per-client persona: which accounts back which claims.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PersonaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<AccountUrn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_accounts: Option<ClaimSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erc_4337: Option<ClaimSelection>,
}

impl PersonaData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.connected_accounts.is_none() && self.erc_4337.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPublicProps {
    pub name: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Wallet sign-in template; must contain the nonce placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_sign_message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Scope catalogue keyed by scope value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMeta {
    pub scopes: BTreeMap<String, ScopeDescriptor>,
}

impl ScopeMeta {
    /// Descriptors for the requested scopes only, keeping unknown ones out.
    #[must_use]
    pub fn restricted_to(&self, requested: &[String]) -> Self {
        let scopes = self
            .scopes
            .iter()
            .filter(|(key, _)| requested.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { scopes }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub identity: IdentityUrn,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Vec<String>,
    pub state: String,
    pub response_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_data: Option<PersonaData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub state: String,
}

/// Outcome of a silent authorization attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preauthorization {
    Granted(AuthorizationCode),
    ConsentRequired,
}

#[derive(Serialize, Deserialize)]
struct PreauthorizationWire {
    preauthorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

impl Serialize for Preauthorization {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Granted(code) => PreauthorizationWire {
                preauthorized: true,
                code: Some(code.code.clone()),
                state: Some(code.state.clone()),
            },
            Self::ConsentRequired => PreauthorizationWire {
                preauthorized: false,
                code: None,
                state: None,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Preauthorization {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = PreauthorizationWire::deserialize(deserializer)?;
        match (wire.preauthorized, wire.code, wire.state) {
            (true, Some(code), Some(state)) => Ok(Self::Granted(AuthorizationCode { code, state })),
            (true, _, _) => Err(de::Error::custom("preauthorized without code and state")),
            (false, _, _) => Ok(Self::ConsentRequired),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: String,
    pub client_id: String,
    pub issuer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub address: String,
    pub template: String,
    pub state: String,
    pub redirect_uri: String,
    pub scope: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceVerifyRequest {
    pub account: AccountUrn,
    pub nonce: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    pub force_account_creation: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOtpRequest {
    pub account: AccountUrn,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOtpVerifyRequest {
    pub account: AccountUrn,
    pub code: String,
    /// Value returned when the code was sent.
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    pub force_account_creation: bool,
}

/// Which identity, if any, an account is bound to after a credential check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResolution {
    #[serde(default)]
    pub identity_urn: Option<IdentityUrn>,
    /// True when the binding predates this authentication. A binding the
    /// core made while verifying (to the session identity, or to a brand new
    /// identity) reports `false`.
    pub existing: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub identity_urn: IdentityUrn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    pub accounts: usize,
    pub applications: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePreview {
    pub source: IdentitySummary,
    pub target: IdentitySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_selection_all_sentinel() {
        let all: ClaimSelection = serde_json::from_str("\"ALL\"").unwrap();
        assert_eq!(all, ClaimSelection::All);
        assert_eq!(serde_json::to_string(&all).unwrap(), "\"ALL\"");
        assert!(serde_json::from_str::<ClaimSelection>("\"SOME\"").is_err());
    }

    #[test]
    fn claim_selection_list() {
        let list: ClaimSelection =
            serde_json::from_str(r#"["urn:rollupid:account/a","urn:rollupid:account/b"]"#).unwrap();
        let ClaimSelection::Accounts(accounts) = list else {
            panic!("expected list");
        };
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn persona_data_wire_names() {
        let persona: PersonaData = serde_json::from_str(
            r#"{"email":"urn:rollupid:account/e","connected_accounts":"ALL","erc_4337":[]}"#,
        )
        .unwrap();
        assert_eq!(persona.connected_accounts, Some(ClaimSelection::All));
        assert!(persona.erc_4337.as_ref().is_some_and(ClaimSelection::is_empty));
        assert!(!persona.is_empty());
        assert!(PersonaData::default().is_empty());
    }

    #[test]
    fn preauthorization_wire() {
        let granted: Preauthorization =
            serde_json::from_str(r#"{"preauthorized":true,"code":"c","state":"s"}"#).unwrap();
        assert_eq!(
            granted,
            Preauthorization::Granted(AuthorizationCode {
                code: "c".to_string(),
                state: "s".to_string()
            })
        );
        let denied: Preauthorization = serde_json::from_str(r#"{"preauthorized":false}"#).unwrap();
        assert_eq!(denied, Preauthorization::ConsentRequired);
        assert!(serde_json::from_str::<Preauthorization>(r#"{"preauthorized":true}"#).is_err());
    }

    #[test]
    fn email_compatible_types() {
        assert!(AccountType::Email.is_email_compatible());
        assert!(AccountType::Google.is_email_compatible());
        assert!(!AccountType::Eth.is_email_compatible());
        assert!(!AccountType::Wallet.is_email_compatible());
    }
}
