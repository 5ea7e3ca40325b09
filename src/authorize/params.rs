//! OAuth request parameters and their validation.

use crate::{core::AppPublicProps, error::PassportError};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use url::Url;
use utoipa::IntoParams;

pub const PASSPORT_CLIENT_ID: &str = "passport";
pub const CONSOLE_CLIENT_ID: &str = "console";

/// First-party clients skip consent and redirect straight back.
#[must_use]
pub fn is_first_party(client_id: &str) -> bool {
    client_id == PASSPORT_CLIENT_ID || client_id == CONSOLE_CLIENT_ID
}

/// Sub-flow requested by the relying party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RollupAction {
    Connect,
    Reconnect,
    Create,
    Preview,
    /// `groupconnect:<group id>`
    GroupConnect(String),
    /// Connect started from the consent screen; the result returns to consent
    /// instead of the client.
    AddAccount,
}

impl RollupAction {
    /// Actions that attach an account to the current identity.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            Self::Connect | Self::Reconnect | Self::GroupConnect(_) | Self::AddAccount
        )
    }
}

impl FromStr for RollupAction {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "reconnect" => Ok(Self::Reconnect),
            "create" => Ok(Self::Create),
            "preview" => Ok(Self::Preview),
            "addaccount" => Ok(Self::AddAccount),
            _ => match s.strip_prefix("groupconnect:") {
                Some(group) if !group.is_empty() => Ok(Self::GroupConnect(group.to_string())),
                _ => Err(PassportError::bad_request(format!("invalid rollup_action: {s}"))),
            },
        }
    }
}

impl fmt::Display for RollupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Reconnect => f.write_str("reconnect"),
            Self::Create => f.write_str("create"),
            Self::Preview => f.write_str("preview"),
            Self::GroupConnect(group) => write!(f, "groupconnect:{group}"),
            Self::AddAccount => f.write_str("addaccount"),
        }
    }
}

impl TryFrom<String> for RollupAction {
    type Error = PassportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RollupAction> for String {
    fn from(value: RollupAction) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prompt {
    Consent,
}

impl FromStr for Prompt {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consent" => Ok(Self::Consent),
            _ => Err(PassportError::bad_request(format!("unsupported prompt: {s}"))),
        }
    }
}

/// Outcome of a connect sub-flow, reported back to the relying party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollupResult {
    Success,
    AlreadyConnectedError,
    AccountConnectError,
    AccountLinkedError,
    Cancel,
}

impl RollupResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::AlreadyConnectedError => "ALREADY_CONNECTED_ERROR",
            Self::AccountConnectError => "ACCOUNT_CONNECT_ERROR",
            Self::AccountLinkedError => "ACCOUNT_LINKED_ERROR",
            Self::Cancel => "CANCEL",
        }
    }
}

impl FromStr for RollupResult {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Success,
            Self::AlreadyConnectedError,
            Self::AccountConnectError,
            Self::AccountLinkedError,
            Self::Cancel,
        ]
        .into_iter()
        .find(|result| result.as_str() == s)
        .ok_or_else(|| PassportError::bad_request(format!("invalid rollup_result: {s}")))
    }
}

/// Validated authorization request, also the authz cookie payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    #[serde(with = "space_delimited")]
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup_action: Option<RollupAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
}

impl AuthzParams {
    /// Params used when a user signs in to passport itself.
    #[must_use]
    pub fn passport_default(redirect_uri: &str) -> Self {
        Self {
            client_id: PASSPORT_CLIENT_ID.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state: "skip".to_string(),
            scope: Vec::new(),
            prompt: None,
            rollup_action: None,
            login_hint: None,
        }
    }

    /// Relative `/authorize` URL that replays these params.
    #[must_use]
    pub fn authorize_path(&self, rollup_result: Option<RollupResult>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", &self.state);
        if !self.scope.is_empty() {
            query.append_pair("scope", &self.scope.join(" "));
        }
        if let Some(Prompt::Consent) = self.prompt {
            query.append_pair("prompt", "consent");
        }
        if let Some(action) = &self.rollup_action {
            query.append_pair("rollup_action", &action.to_string());
        }
        if let Some(hint) = &self.login_hint {
            query.append_pair("login_hint", hint);
        }
        if let Some(result) = rollup_result {
            query.append_pair("rollup_result", result.as_str());
        }
        format!("/authorize?{}", query.finish())
    }
}

/// Raw `/authorize` query.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// Registered client
    pub client_id: Option<String>,
    /// Must match the registered origin
    pub redirect_uri: Option<String>,
    /// Opaque client state
    pub state: Option<String>,
    /// Space delimited scopes
    pub scope: Option<String>,
    /// Only `consent`
    pub prompt: Option<String>,
    pub login_hint: Option<String>,
    /// connect, reconnect, create, preview, addaccount or groupconnect:<id>
    pub rollup_action: Option<String>,
    /// Result of a connect sub-flow
    pub rollup_result: Option<String>,
    /// Only `code`
    pub response_type: Option<String>,
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, PassportError> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PassportError::bad_request(format!("{name} is required")))
}

fn optional(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl AuthorizeQuery {
    /// # Errors
    /// Returns `BadRequest` when `client_id` is missing.
    pub fn client_id(&self) -> Result<&str, PassportError> {
        required(self.client_id.as_ref(), "client_id")
    }

    /// # Errors
    /// Returns `BadRequest` for an unknown action.
    pub fn rollup_action(&self) -> Result<Option<RollupAction>, PassportError> {
        optional(self.rollup_action.as_ref())
            .map(str::parse)
            .transpose()
    }

    /// # Errors
    /// Returns `BadRequest` for an unknown result.
    pub fn rollup_result(&self) -> Result<Option<RollupResult>, PassportError> {
        optional(self.rollup_result.as_ref())
            .map(str::parse)
            .transpose()
    }

    /// Validate a third-party request against the registered app.
    ///
    /// # Errors
    /// Returns `BadRequest` when a required parameter is missing or malformed,
    /// or when `redirect_uri` is not on the registered origin.
    pub fn validate(&self, app: &AppPublicProps) -> Result<AuthzParams, PassportError> {
        let client_id = self.client_id()?;
        let redirect_uri = required(self.redirect_uri.as_ref(), "redirect_uri")?;
        let state = required(self.state.as_ref(), "state")?;

        if let Some(response_type) = optional(self.response_type.as_ref()) {
            if response_type != "code" {
                return Err(PassportError::bad_request(format!(
                    "unsupported response_type: {response_type}"
                )));
            }
        }

        validate_redirect_uri(redirect_uri, &app.redirect_uri)?;

        Ok(AuthzParams {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state: state.to_string(),
            scope: parse_scope(self.scope.as_deref().unwrap_or_default()),
            prompt: optional(self.prompt.as_ref())
                .map(str::parse::<Prompt>)
                .transpose()?,
            rollup_action: self.rollup_action()?,
            login_hint: optional(self.login_hint.as_ref()).map(ToString::to_string),
        })
    }
}

/// Require `candidate` to share scheme, host and port with `registered`.
///
/// # Errors
/// Returns `BadRequest` when either URL is unparsable or the origins differ.
pub fn validate_redirect_uri(candidate: &str, registered: &str) -> Result<Url, PassportError> {
    let candidate_url = Url::parse(candidate)
        .map_err(|_| PassportError::bad_request("invalid redirect_uri"))?;
    let registered_url = Url::parse(registered)
        .map_err(|_| PassportError::bad_request("invalid registered redirect_uri"))?;

    if candidate_url.origin() != registered_url.origin() || !candidate_url.origin().is_tuple() {
        return Err(PassportError::bad_request(
            "redirect_uri does not match the registered origin",
        ));
    }

    Ok(candidate_url)
}

/// Split a scope string on spaces or commas, dropping duplicates.
#[must_use]
pub fn parse_scope(raw: &str) -> Vec<String> {
    let mut scope: Vec<String> = Vec::new();
    for value in raw.split([' ', ',']).map(str::trim).filter(|v| !v.is_empty()) {
        if !scope.iter().any(|s| s == value) {
            scope.push(value.to_string());
        }
    }
    scope
}

mod space_delimited {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(scope: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&scope.join(" "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(super::parse_scope(&raw))
    }
}
