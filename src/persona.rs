//! Scope to claim resolution and persona validation.

use crate::{
    core::{AccountProfile, AccountType, ClaimSelection, CoreClient, PersonaData},
    error::PassportError,
    urn::{AccountUrn, IdentityUrn},
};
use serde::Serialize;
use tracing::{instrument, warn};

pub const EMAIL_SCOPE: &str = "email";
pub const CONNECTED_ACCOUNTS_SCOPE: &str = "connected_accounts";
pub const ERC_4337_SCOPE: &str = "erc_4337";

const PERSONA_SCOPES: [&str; 3] = [EMAIL_SCOPE, CONNECTED_ACCOUNTS_SCOPE, ERC_4337_SCOPE];

fn requests(scope: &[String], claim: &str) -> bool {
    scope.iter().any(|s| s == claim)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCandidate {
    pub urn: AccountUrn,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl From<&AccountProfile> for ClaimCandidate {
    fn from(account: &AccountProfile) -> Self {
        Self {
            urn: account.urn.clone(),
            account_type: account.account_type,
            address: account.address.clone(),
            title: account.title.clone(),
        }
    }
}

fn email_candidates(accounts: &[AccountProfile]) -> Vec<ClaimCandidate> {
    accounts
        .iter()
        .filter(|a| a.account_type.is_email_compatible())
        .map(ClaimCandidate::from)
        .collect()
}

/// Everything but smart contract wallets and generated masks.
fn connected_account_candidates(accounts: &[AccountProfile]) -> Vec<ClaimCandidate> {
    accounts
        .iter()
        .filter(|a| !matches!(a.account_type, AccountType::Wallet | AccountType::Mask))
        .map(ClaimCandidate::from)
        .collect()
}

fn wallet_candidates(accounts: &[AccountProfile]) -> Vec<ClaimCandidate> {
    accounts
        .iter()
        .filter(|a| a.account_type == AccountType::Wallet)
        .map(ClaimCandidate::from)
        .collect()
}

/// Candidate values per requested claim plus the current selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataForScopes {
    pub connected_emails: Vec<ClaimCandidate>,
    pub connected_accounts: Vec<ClaimCandidate>,
    pub connected_smart_contract_wallets: Vec<ClaimCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_data: Option<PersonaData>,
}

impl DataForScopes {
    /// Consent cannot be given for `email` without an email to share.
    #[must_use]
    pub fn disable_authorize(&self, scope: &[String]) -> bool {
        requests(scope, EMAIL_SCOPE) && self.connected_emails.is_empty()
    }
}

/// Gather the claim candidates `identity` owns for `scope`.
///
/// # Errors
/// Returns the core error when accounts or persona data cannot be read.
#[instrument(skip(core))]
pub async fn get_data_for_scopes(
    core: &dyn CoreClient,
    scope: &[String],
    identity: &IdentityUrn,
    client_id: &str,
) -> Result<DataForScopes, PassportError> {
    let needs_accounts = PERSONA_SCOPES.iter().any(|claim| requests(scope, claim));

    let accounts = async {
        if needs_accounts {
            core.get_identity_accounts(identity).await
        } else {
            Ok(Vec::new())
        }
    };

    let (accounts, persona_data) =
        tokio::try_join!(accounts, core.get_persona_data(identity, client_id))?;

    let mut data = DataForScopes {
        persona_data,
        ..DataForScopes::default()
    };

    if requests(scope, EMAIL_SCOPE) {
        data.connected_emails = email_candidates(&accounts);
    }
    if requests(scope, CONNECTED_ACCOUNTS_SCOPE) {
        data.connected_accounts = connected_account_candidates(&accounts);
    }
    if requests(scope, ERC_4337_SCOPE) {
        data.connected_smart_contract_wallets = wallet_candidates(&accounts);
    }

    Ok(data)
}

fn owned<'a>(accounts: &'a [AccountProfile], urn: &AccountUrn) -> Option<&'a AccountProfile> {
    accounts.iter().find(|a| a.urn.same_account(urn))
}

/// Check that every selected value belongs to `identity`.
///
/// `ALL` selections are not checked against a snapshot; they resolve at read
/// time.
///
/// # Errors
/// `BadRequest` for an unusable email selection, `Unauthorized` for a listed
/// account the identity does not own.
#[instrument(skip(core, persona))]
pub async fn validate_persona_data(
    core: &dyn CoreClient,
    identity: &IdentityUrn,
    persona: &PersonaData,
) -> Result<(), PassportError> {
    if persona.is_empty() {
        return Ok(());
    }

    let accounts = core.get_identity_accounts(identity).await?;

    if let Some(email) = &persona.email {
        let account = owned(&accounts, email).ok_or_else(|| {
            warn!("email account {} is not owned by {}", email, identity);
            PassportError::bad_request("email account does not belong to the authenticated identity")
        })?;
        if !account.account_type.is_email_compatible() {
            return Err(PassportError::bad_request(
                "selected email account cannot provide an email address",
            ));
        }
    }

    if let Some(ClaimSelection::Accounts(selected)) = &persona.connected_accounts {
        if let Some(stray) = selected.iter().find(|urn| owned(&accounts, urn).is_none()) {
            warn!("connected account {} is not owned by {}", stray, identity);
            return Err(PassportError::unauthorized(
                "connected accounts do not belong to the authenticated identity",
            ));
        }
    }

    if let Some(ClaimSelection::Accounts(selected)) = &persona.erc_4337 {
        for urn in selected {
            match owned(&accounts, urn) {
                None => {
                    warn!("wallet {} is not owned by {}", urn, identity);
                    return Err(PassportError::unauthorized(
                        "smart contract wallets do not belong to the authenticated identity",
                    ));
                }
                Some(account) if account.account_type != AccountType::Wallet => {
                    return Err(PassportError::bad_request(format!(
                        "{urn} is not a smart contract wallet"
                    )));
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

/// Concrete claim values for a persona, as they stand now.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<ClaimCandidate>,
    pub connected_accounts: Vec<ClaimCandidate>,
    pub erc_4337: Vec<ClaimCandidate>,
}

fn resolve_selection(
    selection: Option<&ClaimSelection>,
    candidates: Vec<ClaimCandidate>,
) -> Vec<ClaimCandidate> {
    match selection {
        None => Vec::new(),
        Some(ClaimSelection::All) => candidates,
        Some(ClaimSelection::Accounts(selected)) => candidates
            .into_iter()
            .filter(|c| selected.iter().any(|urn| urn.same_account(&c.urn)))
            .collect(),
    }
}

/// Expand `persona` for `scope` against the accounts `identity` owns now.
///
/// # Errors
/// Returns the core error when accounts cannot be read.
#[instrument(skip(core, persona))]
pub async fn resolve_persona_claims(
    core: &dyn CoreClient,
    identity: &IdentityUrn,
    scope: &[String],
    persona: &PersonaData,
) -> Result<ResolvedClaims, PassportError> {
    if persona.is_empty() {
        return Ok(ResolvedClaims::default());
    }

    let accounts = core.get_identity_accounts(identity).await?;
    let mut claims = ResolvedClaims::default();

    if requests(scope, EMAIL_SCOPE) {
        claims.email = persona
            .email
            .as_ref()
            .and_then(|urn| owned(&accounts, urn))
            .filter(|account| account.account_type.is_email_compatible())
            .map(ClaimCandidate::from);
    }
    if requests(scope, CONNECTED_ACCOUNTS_SCOPE) {
        claims.connected_accounts = resolve_selection(
            persona.connected_accounts.as_ref(),
            connected_account_candidates(&accounts),
        );
    }
    if requests(scope, ERC_4337_SCOPE) {
        claims.erc_4337 =
            resolve_selection(persona.erc_4337.as_ref(), wallet_candidates(&accounts));
    }

    Ok(claims)
}
