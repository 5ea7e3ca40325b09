//! Authorization code exchange and first-login profile provisioning.

use crate::{
    core::{AccountProfile, CoreClient, Profile, TokenRequest, TokenSet},
    error::PassportError,
    session::token::check_token,
    urn::{AccountUrn, IdentityUrn},
};
use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

/// Result of a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenExchange {
    pub tokens: TokenSet,
    pub identity: IdentityUrn,
    pub profile: Profile,
    /// Whether this exchange provisioned the profile.
    pub profile_created: bool,
}

/// Exchange `code` and make sure the identity behind it has a profile.
///
/// # Errors
/// Returns the core error, or `Internal` when the issued token does not name
/// an identity.
#[instrument(skip(core, code))]
pub async fn exchange_token(
    core: &dyn CoreClient,
    code: &str,
    client_id: &str,
    issuer: &str,
    account: &AccountUrn,
) -> Result<TokenExchange, PassportError> {
    let tokens = core
        .exchange_token(&TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: code.to_string(),
            client_id: client_id.to_string(),
            issuer: issuer.to_string(),
        })
        .await?;

    let claims = check_token(&tokens.access_token)
        .map_err(|e| PassportError::internal(format!("issued access token is unusable: {e}")))?;
    let identity = IdentityUrn::parse(&claims.sub)
        .map_err(|e| PassportError::internal(format!("issued access token: {e}")))?;

    let (profile, profile_created) =
        provision_profile(core, &tokens.access_token, &identity, account).await?;

    Ok(TokenExchange {
        tokens,
        identity,
        profile,
        profile_created,
    })
}

/// Store a default profile unless one exists; never overwrites.
///
/// # Errors
/// Returns the core error.
pub async fn provision_profile(
    core: &dyn CoreClient,
    jwt: &str,
    identity: &IdentityUrn,
    account: &AccountUrn,
) -> Result<(Profile, bool), PassportError> {
    if let Some(profile) = core.get_profile(identity).await? {
        return Ok((profile, false));
    }

    let account_profile = core.get_account_profile(account).await?;
    let profile = default_profile(&account_profile);

    core.set_profile(jwt, identity, &profile).await?;

    info!("provisioned profile for {}", identity);

    Ok((profile, true))
}

#[must_use]
pub fn default_profile(account: &AccountProfile) -> Profile {
    let alias = account
        .urn
        .alias()
        .map_or_else(|| account.address.clone(), ToString::to_string);

    Profile {
        display_name: account.title.clone().unwrap_or_else(|| alias.clone()),
        picture: account
            .icon
            .clone()
            .unwrap_or_else(|| gradient_avatar(&alias)),
        primary_account_urn: Some(account.urn.clone()),
    }
}

/// Deterministic two-colour gradient keyed by `seed`, as an SVG data URL.
#[must_use]
pub fn gradient_avatar(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hue = |hi: u8, lo: u8| ((u16::from(hi) << 8) | u16::from(lo)) % 360;
    let from = hue(digest[0], digest[1]);
    let to = hue(digest[2], digest[3]);
    let angle = u16::from(digest[4]) % 360;

    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="256" height="256" viewBox="0 0 256 256"><defs><linearGradient id="g" gradientTransform="rotate({angle} .5 .5)"><stop offset="0%" stop-color="hsl({from}, 80%, 60%)"/><stop offset="100%" stop-color="hsl({to}, 80%, 45%)"/></linearGradient></defs><rect width="256" height="256" fill="url(#g)"/></svg>"#
    );

    format!(
        "data:image/svg+xml;base64,{}",
        Base64::encode_string(svg.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{memory::MemoryCore, AccountType, AuthorizeRequest};

    fn wallet() -> AccountProfile {
        AccountProfile {
            urn: AccountUrn::componentized("w1", "crypto", "eth", "0xfeed"),
            account_type: AccountType::Eth,
            address: "0xfeed".to_string(),
            title: None,
            icon: None,
        }
    }

    async fn code_for(core: &MemoryCore, identity: &IdentityUrn) -> String {
        core.authorize(&AuthorizeRequest {
            identity: identity.clone(),
            client_id: "passport".to_string(),
            redirect_uri: "https://passport.test/settings".to_string(),
            scope: Vec::new(),
            state: "s".to_string(),
            response_type: "code".to_string(),
            persona_data: None,
        })
        .await
        .unwrap()
        .code
    }

    #[test]
    fn gradient_is_deterministic() {
        let a = gradient_avatar("0xfeed");
        assert_eq!(a, gradient_avatar("0xfeed"));
        assert_ne!(a, gradient_avatar("0xbeef"));
        assert!(a.starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn default_profile_prefers_account_details() {
        let mut account = wallet();
        let profile = default_profile(&account);
        assert_eq!(profile.display_name, "0xfeed");
        assert_eq!(profile.picture, gradient_avatar("0xfeed"));

        account.title = Some("alice.eth".to_string());
        account.icon = Some("https://img.test/a.png".to_string());
        let profile = default_profile(&account);
        assert_eq!(profile.display_name, "alice.eth");
        assert_eq!(profile.picture, "https://img.test/a.png");
    }

    #[tokio::test]
    async fn profile_is_provisioned_exactly_once() {
        let core = MemoryCore::new("https://passport.test");
        let identity = core.create_identity(wallet()).await;

        let code = code_for(&core, &identity).await;
        let first = exchange_token(&core, &code, "passport", "https://passport.test", &wallet().urn)
            .await
            .unwrap();
        assert!(first.profile_created);
        assert_eq!(first.identity, identity);

        core.put_profile(
            &identity,
            Profile {
                display_name: "renamed".to_string(),
                ..first.profile.clone()
            },
        )
        .await;

        let code = code_for(&core, &identity).await;
        let second = exchange_token(&core, &code, "passport", "https://passport.test", &wallet().urn)
            .await
            .unwrap();
        assert!(!second.profile_created);
        assert_eq!(second.profile.display_name, "renamed");
        assert_eq!(core.profile_writes().await, 1);
    }

    #[tokio::test]
    async fn reused_code_fails() {
        let core = MemoryCore::new("https://passport.test");
        let identity = core.create_identity(wallet()).await;
        let code = code_for(&core, &identity).await;
        exchange_token(&core, &code, "passport", "https://passport.test", &wallet().urn)
            .await
            .unwrap();
        assert!(matches!(
            exchange_token(&core, &code, "passport", "https://passport.test", &wallet().urn).await,
            Err(PassportError::Core(_))
        ));
    }
}
