//! Namespaced identifiers for identities and accounts.
//!
//! Account URNs carry optional components after the base URN: routing
//! components introduced by `?+` (`node_type`, `addr_type`) and query
//! components introduced by `?=` (`alias`, `hidden`). Ownership checks always
//! compare base URNs so that component drift never changes identity.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const IDENTITY_URN_PREFIX: &str = "urn:rollupid:identity/";
pub const ACCOUNT_URN_PREFIX: &str = "urn:rollupid:account/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} urn: {value}")]
pub struct UrnError {
    kind: &'static str,
    value: String,
}

/// Identity aggregate identifier, e.g. `urn:rollupid:identity/01H...`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityUrn(String);

impl IdentityUrn {
    /// Parse an identity URN; components are not allowed on identities.
    ///
    /// # Errors
    /// Returns `UrnError` when the prefix or the id is missing.
    pub fn parse(value: &str) -> Result<Self, UrnError> {
        match value.strip_prefix(IDENTITY_URN_PREFIX) {
            Some(id) if !id.is_empty() && !id.contains('?') => Ok(Self(value.to_string())),
            _ => Err(UrnError {
                kind: "identity",
                value: value.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Self {
        Self(format!("{IDENTITY_URN_PREFIX}{id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdentityUrn {
    type Error = UrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdentityUrn> for String {
    fn from(value: IdentityUrn) -> Self {
        value.0
    }
}

impl fmt::Display for IdentityUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account (credential) identifier with optional components.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountUrn(String);

impl AccountUrn {
    /// # Errors
    /// Returns `UrnError` when the prefix or the id is missing.
    pub fn parse(value: &str) -> Result<Self, UrnError> {
        match value.strip_prefix(ACCOUNT_URN_PREFIX) {
            Some(rest) if !rest.is_empty() && !rest.starts_with('?') => {
                Ok(Self(value.to_string()))
            }
            _ => Err(UrnError {
                kind: "account",
                value: value.to_string(),
            }),
        }
    }

    /// Build a componentized account URN.
    #[must_use]
    pub fn componentized(id: &str, node_type: &str, addr_type: &str, alias: &str) -> Self {
        Self(format!(
            "{ACCOUNT_URN_PREFIX}{id}?+node_type={node_type}&addr_type={addr_type}?=alias={alias}"
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URN without any components.
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(base, _)| base)
    }

    /// Same credential, regardless of components.
    #[must_use]
    pub fn same_account(&self, other: &Self) -> bool {
        self.base() == other.base()
    }

    /// Look up a routing or query component by key.
    #[must_use]
    pub fn component(&self, key: &str) -> Option<&str> {
        let (_, rest) = self.0.split_once('?')?;
        rest.split('?')
            .flat_map(|section| section.trim_start_matches(['+', '=']).split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.component("alias")
    }
}

impl TryFrom<String> for AccountUrn {
    type Error = UrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountUrn> for String {
    fn from(value: AccountUrn) -> Self {
        value.0
    }
}

impl fmt::Display for AccountUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
