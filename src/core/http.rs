use super::{
    AccountProfile, AccountResolution, AppPublicProps, AuthorizationCode, AuthorizeRequest,
    CoreClient, CoreError, EmailOtpRequest, EmailOtpVerifyRequest, MergePreview, NonceRequest,
    NonceVerifyRequest, PersonaData, Preauthorization, Profile, ScopeMeta, TokenRequest, TokenSet,
};
use crate::{
    urn::{AccountUrn, IdentityUrn},
    APP_USER_AGENT,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

/// Core client speaking JSON over HTTP: `POST {core_url}/rpc/{method}`.
#[derive(Clone, Debug)]
pub struct HttpCoreClient {
    base: Url,
    client: Client,
}

impl HttpCoreClient {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(core_url: &str) -> Result<Self, CoreError> {
        let mut base = Url::parse(core_url)?;

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { base, client })
    }

    fn endpoint(&self, method: &str) -> Result<Url, CoreError> {
        Ok(self.base.join(&format!("rpc/{method}"))?)
    }

    #[instrument(skip(self, jwt, input))]
    async fn call<I, O>(&self, method: &str, jwt: Option<&str>, input: &I) -> Result<O, CoreError>
    where
        I: Serialize + ?Sized + Sync,
        O: DeserializeOwned,
    {
        let url = self.endpoint(method)?;

        let mut request = self.client.post(url).json(input);

        if let Some(jwt) = jwt {
            request = request.bearer_auth(jwt);
        }

        let response = request.send().await?;

        let status = response.status();

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);

            let message = body["message"]
                .as_str()
                .map_or_else(|| status.to_string(), ToString::to_string);

            error!("core {} failed: {}, {}", method, status, message);

            return Err(CoreError::rpc(status.as_u16(), message));
        }

        debug!("core {} succeeded", method);

        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(|e| CoreError::Decode(format!("{method}: {e}")))
    }
}

#[async_trait]
impl CoreClient for HttpCoreClient {
    async fn get_app_public_props(&self, client_id: &str) -> Result<AppPublicProps, CoreError> {
        self.call("getAppPublicProps", None, &json!({ "clientId": client_id }))
            .await
    }

    async fn get_scopes(&self) -> Result<ScopeMeta, CoreError> {
        self.call("getScopes", None, &json!({})).await
    }

    async fn preauthorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<Preauthorization, CoreError> {
        self.call("preauthorize", None, request).await
    }

    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizationCode, CoreError> {
        self.call("authorize", None, request).await
    }

    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenSet, CoreError> {
        self.call("exchangeToken", None, request).await
    }

    async fn get_profile(&self, identity: &IdentityUrn) -> Result<Option<Profile>, CoreError> {
        self.call("getProfile", None, &json!({ "identity": identity }))
            .await
    }

    async fn set_profile(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        profile: &Profile,
    ) -> Result<(), CoreError> {
        let _: Value = self
            .call(
                "setProfile",
                Some(jwt),
                &json!({ "identity": identity, "profile": profile }),
            )
            .await?;
        Ok(())
    }

    async fn get_nonce(&self, request: &NonceRequest) -> Result<String, CoreError> {
        let response: Value = self.call("getNonce", None, request).await?;

        response["nonce"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| CoreError::Decode("getNonce: no nonce in response".to_string()))
    }

    async fn verify_nonce(
        &self,
        request: &NonceVerifyRequest,
    ) -> Result<AccountResolution, CoreError> {
        self.call("verifyNonce", request.jwt.as_deref(), request)
            .await
    }

    async fn generate_email_otp(&self, request: &EmailOtpRequest) -> Result<String, CoreError> {
        let response: Value = self.call("generateEmailOTP", None, request).await?;

        response["state"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| CoreError::Decode("generateEmailOTP: no state in response".to_string()))
    }

    async fn verify_email_otp(
        &self,
        request: &EmailOtpVerifyRequest,
    ) -> Result<AccountResolution, CoreError> {
        self.call("verifyEmailOTP", request.jwt.as_deref(), request)
            .await
    }

    async fn link_account(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        account: &AccountUrn,
    ) -> Result<(), CoreError> {
        let _: Value = self
            .call(
                "linkAccount",
                Some(jwt),
                &json!({ "identity": identity, "account": account }),
            )
            .await?;
        Ok(())
    }

    async fn get_identity_accounts(
        &self,
        identity: &IdentityUrn,
    ) -> Result<Vec<AccountProfile>, CoreError> {
        self.call("getIdentityAccounts", None, &json!({ "identity": identity }))
            .await
    }

    async fn get_account_profile(&self, account: &AccountUrn) -> Result<AccountProfile, CoreError> {
        self.call("getAccountProfile", None, &json!({ "account": account }))
            .await
    }

    async fn get_persona_data(
        &self,
        identity: &IdentityUrn,
        client_id: &str,
    ) -> Result<Option<PersonaData>, CoreError> {
        self.call(
            "getPersonaData",
            None,
            &json!({ "identity": identity, "clientId": client_id }),
        )
        .await
    }

    async fn init_smart_contract_wallet(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        nickname: &str,
    ) -> Result<AccountUrn, CoreError> {
        let response: Value = self
            .call(
                "initSmartContractWallet",
                Some(jwt),
                &json!({ "identity": identity, "nickname": nickname }),
            )
            .await?;

        serde_json::from_value(response["accountURN"].clone())
            .map_err(|e| CoreError::Decode(format!("initSmartContractWallet: {e}")))
    }

    async fn is_account_valid(&self, jwt: &str) -> Result<bool, CoreError> {
        let response: Value = self.call("isValid", Some(jwt), &json!({})).await?;
        Ok(response["valid"].as_bool().unwrap_or(false))
    }

    async fn merge_preview(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<MergePreview, CoreError> {
        self.call(
            "mergePreview",
            Some(jwt),
            &json!({ "source": source, "target": target }),
        )
        .await
    }

    async fn merge_identities(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<(), CoreError> {
        let _: Value = self
            .call(
                "merge",
                Some(jwt),
                &json!({ "source": source, "target": target }),
            )
            .await?;
        Ok(())
    }
}
