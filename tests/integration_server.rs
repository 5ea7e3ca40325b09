//! End-to-end tests driving the router against the in-memory core.
//!
//! A small cookie jar carries the signed cookies between requests the way a
//! browser would, so every redirect hop goes through the real handlers.

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use passport::{
    core::{
        memory::MemoryCore, AccountProfile, AccountType, AppPublicProps, ClaimSelection,
        CoreClient,
    },
    email::email_account_urn,
    nonce::wallet_account_urn,
    passport::{
        router,
        state::{PassportConfig, PassportState},
    },
    urn::{AccountUrn, IdentityUrn},
};
use secrecy::SecretString;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tower::ServiceExt;

const PASSPORT_URL: &str = "http://passport.test";
const APP_REDIRECT: &str = "https://app.test/callback";
const WALLET_A: &str = "0x1111111111111111111111111111111111111111";
const WALLET_B: &str = "0x2222222222222222222222222222222222222222";
const WALLET_C: &str = "0x3333333333333333333333333333333333333333";

#[derive(Default)]
struct Jar(BTreeMap<String, String>);

impl Jar {
    fn store(&mut self, response: &Response) {
        for cookie in response.headers().get_all(SET_COOKIE) {
            let Some(pair) = cookie.to_str().ok().and_then(|c| c.split(';').next()) else {
                continue;
            };
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                self.0.remove(name);
            } else {
                self.0.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn header(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

struct Harness {
    core: Arc<MemoryCore>,
    state: Arc<PassportState>,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        let core = Arc::new(MemoryCore::new(PASSPORT_URL).with_app(
            "app",
            AppPublicProps {
                name: "Test App".to_string(),
                redirect_uri: APP_REDIRECT.to_string(),
                icon_url: None,
                terms_url: None,
                privacy_url: None,
                scopes: vec!["openid".to_string(), "email".to_string()],
                custom_sign_message: None,
            },
        ));
        let config = PassportConfig::new(
            PASSPORT_URL,
            "http://console.test",
            SecretString::from("integration-secret-integration-secret".to_string()),
        );
        let dyn_core: Arc<dyn CoreClient> = core.clone();
        let state = Arc::new(PassportState::new(config, dyn_core));
        let app = router(state.clone());
        Self { core, state, app }
    }

    async fn send(&self, jar: &mut Jar, request: Request<Body>) -> Response {
        let response = self.app.clone().oneshot(request).await.unwrap();
        jar.store(&response);
        response
    }

    async fn get(&self, jar: &mut Jar, uri: &str) -> Response {
        let request = Request::builder()
            .uri(uri)
            .header(COOKIE, jar.header())
            .body(Body::empty())
            .unwrap();
        self.send(jar, request).await
    }

    async fn post(&self, jar: &mut Jar, uri: &str, form: &[(&str, &str)]) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(COOKIE, jar.header())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(jar, request).await
    }

    /// Answer the wallet challenge for `address` as `client_id`.
    async fn sign(&self, jar: &mut Jar, client_id: &str, address: &str) -> Response {
        let uri = format!("/authenticate/{client_id}/sign/{address}");
        let challenge = json(self.get(jar, &uri).await).await;
        let nonce = challenge["nonce"].as_str().unwrap().to_string();
        assert!(challenge["message"].as_str().unwrap().contains(&nonce));

        let signature = MemoryCore::signature_for(address, &nonce);
        self.post(jar, &uri, &[("nonce", nonce.as_str()), ("signature", signature.as_str())])
            .await
    }

    /// Sign in to `app` with `address`, leaving the consent screen pending.
    async fn login(&self, jar: &mut Jar, address: &str, scope: &str) -> Response {
        let response = self.get(jar, &authorize_uri(scope, &[])).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/authenticate/app/account");

        let response = self.sign(jar, "app", address).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(jar.has("_rollup_session_last"));

        self.get(jar, &location(&response)).await
    }

    async fn identity_of(&self, address: &str) -> IdentityUrn {
        self.core
            .account_identity(&wallet_account_urn(address))
            .await
            .unwrap()
    }
}

fn authorize_uri(scope: &str, extra: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", "app")
        .append_pair("redirect_uri", APP_REDIRECT)
        .append_pair("state", "xyz")
        .append_pair("scope", scope)
        .extend_pairs(extra)
        .finish();
    format!("/authorize?{query}")
}

fn location(response: &Response) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_string()
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|cookie| cookie.to_str().ok())
        .any(|cookie| cookie.starts_with(&format!("{name}=")))
}

fn wallet_profile(address: &str) -> AccountProfile {
    AccountProfile {
        urn: wallet_account_urn(address),
        account_type: AccountType::Eth,
        address: address.to_string(),
        title: None,
        icon: None,
    }
}

#[tokio::test]
async fn wallet_login_consent_and_silent_reauthorization() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness
        .login(&mut jar, WALLET_A, "openid connected_accounts")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let consent = json(response).await;
    assert_eq!(consent["clientId"], "app");
    assert_eq!(consent["state"], "xyz");
    assert_eq!(consent["disableAuthorize"], false);
    assert_eq!(consent["candidates"]["connectedAccounts"].as_array().unwrap().len(), 1);
    assert_eq!(harness.core.profile_writes().await, 1);

    let response = harness
        .post(
            &mut jar,
            "/authorize",
            &[
                ("client_id", "app"),
                ("redirect_uri", APP_REDIRECT),
                ("state", "xyz"),
                ("scopes", "openid connected_accounts"),
                ("personaData", r#"{"connected_accounts":"ALL"}"#),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with("https://app.test/callback?code="));
    assert!(target.ends_with("&state=xyz"));
    assert!(!jar.has("_rollup_client_params_app"));

    // covered by the earlier grant
    let response = harness
        .get(&mut jar, &authorize_uri("openid connected_accounts", &[]))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://app.test/callback?code="));

    // narrower request is covered too
    let response = harness.get(&mut jar, &authorize_uri("openid", &[])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = harness
        .get(
            &mut jar,
            &authorize_uri("openid connected_accounts", &[("prompt", "consent")]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let consent = json(response).await;
    assert_eq!(consent["selected"]["connectedAccounts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn passport_login_lands_on_settings() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness.get(&mut jar, "/authorize?client_id=passport").await;
    assert_eq!(location(&response), "/authenticate/passport/account");

    let response = harness.sign(&mut jar, "passport", WALLET_A).await;
    assert!(jar.has("_rollup_session"));
    let next = location(&response);
    assert!(next.starts_with("/authorize?client_id=passport"));

    let response = harness.get(&mut jar, &next).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://passport.test/settings");

    let landing = json(harness.get(&mut jar, "/authenticate/passport").await).await;
    assert_eq!(landing["authenticated"], true);
}

#[tokio::test]
async fn redirect_uri_on_foreign_origin_rejected() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let uri = "/authorize?client_id=app&redirect_uri=https%3A%2F%2Fevil.test%2Fcb&state=xyz";
    let response = harness.get(&mut jar, uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert!(body["message"].as_str().unwrap().contains("redirect_uri"));
    assert!(!jar.has("_rollup_client_params_app"));
}

#[tokio::test]
async fn missing_state_and_unknown_client_rejected() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let uri = "/authorize?client_id=app&redirect_uri=https%3A%2F%2Fapp.test%2Fcallback";
    let response = harness.get(&mut jar, uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let uri = "/authorize?client_id=nope&redirect_uri=https%3A%2F%2Fapp.test%2Fcb&state=x";
    let response = harness.get(&mut jar, uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_redirects_with_access_denied() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness
        .post(
            &mut jar,
            "/authorize",
            &[
                ("client_id", "app"),
                ("state", "xyz"),
                ("cancel", APP_REDIRECT),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "https://app.test/callback?error=access_denied&state=xyz"
    );
}

#[tokio::test]
async fn email_scope_offers_email_accounts_only() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let consent = json(harness.login(&mut jar, WALLET_A, "openid email").await).await;
    assert_eq!(consent["candidates"]["connectedEmails"].as_array().unwrap().len(), 0);
    assert_eq!(consent["disableAuthorize"], true);

    let identity = harness.identity_of(WALLET_A).await;
    let email = AccountUrn::componentized("e1", "email", "email", "alice@example.com");
    harness
        .core
        .add_account(
            &identity,
            AccountProfile {
                urn: email.clone(),
                account_type: AccountType::Email,
                address: "alice@example.com".to_string(),
                title: None,
                icon: None,
            },
        )
        .await;

    let response = harness.get(&mut jar, &authorize_uri("openid email", &[])).await;
    let consent = json(response).await;
    let emails = consent["candidates"]["connectedEmails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["address"], "alice@example.com");
    assert_eq!(consent["disableAuthorize"], false);

    // a wallet is not an email
    let persona = format!(
        r#"{{"email":"{}"}}"#,
        wallet_account_urn(WALLET_A).as_str()
    );
    let response = harness
        .post(
            &mut jar,
            "/authorize",
            &[
                ("client_id", "app"),
                ("redirect_uri", APP_REDIRECT),
                ("state", "xyz"),
                ("scopes", "openid email"),
                ("personaData", persona.as_str()),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let persona = format!(r#"{{"email":"{}"}}"#, email.as_str());
    let response = harness
        .post(
            &mut jar,
            "/authorize",
            &[
                ("client_id", "app"),
                ("redirect_uri", APP_REDIRECT),
                ("state", "xyz"),
                ("scopes", "openid email"),
                ("personaData", persona.as_str()),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn connect_reports_each_outcome() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    harness.login(&mut jar, WALLET_A, "openid").await;
    let identity = harness.identity_of(WALLET_A).await;

    let connect = authorize_uri("openid", &[("rollup_action", "connect")]);

    // the signed-in wallet itself
    let response = harness.get(&mut jar, &connect).await;
    assert_eq!(location(&response), "/authenticate/app?rollup_action=connect");
    let response = harness.sign(&mut jar, "app", WALLET_A).await;
    let next = location(&response);
    assert!(next.contains("rollup_result=ALREADY_CONNECTED_ERROR"));
    let response = harness.get(&mut jar, &next).await;
    assert_eq!(
        location(&response),
        "https://app.test/callback?rollup_action=connect&rollup_result=ALREADY_CONNECTED_ERROR&state=xyz"
    );

    // an unbound wallet joins the identity
    harness.get(&mut jar, &connect).await;
    let response = harness.sign(&mut jar, "app", WALLET_B).await;
    assert!(location(&response).contains("rollup_result=SUCCESS"));
    assert_eq!(harness.identity_of(WALLET_B).await, identity);
}

#[tokio::test]
async fn connect_without_session_fails() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let connect = authorize_uri("openid", &[("rollup_action", "connect")]);
    harness.get(&mut jar, &connect).await;
    let response = harness.sign(&mut jar, "app", WALLET_C).await;
    assert!(location(&response).contains("rollup_result=ACCOUNT_CONNECT_ERROR"));
    assert!(harness
        .core
        .account_identity(&wallet_account_urn(WALLET_C))
        .await
        .is_none());
}

#[tokio::test]
async fn linked_elsewhere_requires_merge_confirmation() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    let other = harness.core.create_identity(wallet_profile(WALLET_B)).await;

    harness.login(&mut jar, WALLET_A, "openid").await;
    let identity = harness.identity_of(WALLET_A).await;

    let connect = authorize_uri("openid", &[("rollup_action", "connect")]);
    harness.get(&mut jar, &connect).await;
    let response = harness.sign(&mut jar, "app", WALLET_B).await;
    assert!(location(&response).contains("rollup_result=ACCOUNT_LINKED_ERROR"));
    assert!(jar.has("_rollup_identity_merge"));

    // the browser reports the conflict to the client, which drops the pending params
    let response = harness.get(&mut jar, &location(&response)).await;
    assert_eq!(
        location(&response),
        "https://app.test/callback?rollup_action=connect&rollup_result=ACCOUNT_LINKED_ERROR&state=xyz"
    );
    assert!(!jar.has("_rollup_client_params_app"));
    assert!(!jar.has("_rollup_client_params_last"));
    assert!(!jar.has("_rollup_session"));

    // nothing moved yet
    assert_eq!(harness.identity_of(WALLET_B).await, other);

    let prompt = json(harness.get(&mut jar, "/merge-identity/prompt").await).await;
    assert_eq!(prompt["alias"], WALLET_B);

    let response = harness.get(&mut jar, "/merge-identity/confirm").await;
    assert_eq!(response.status(), StatusCode::OK);
    let preview = json(response).await;
    assert_eq!(preview["source"]["identityUrn"], other.as_str());

    let response = harness.post(&mut jar, "/merge-identity/confirm", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let next = location(&response);
    assert!(next.starts_with("/authorize?client_id=app&"));
    assert!(next.contains("rollup_result=SUCCESS"));
    assert!(!jar.has("_rollup_identity_merge"));

    let response = harness.get(&mut jar, &next).await;
    assert_eq!(
        location(&response),
        "https://app.test/callback?rollup_action=connect&rollup_result=SUCCESS&state=xyz"
    );
    assert_eq!(harness.identity_of(WALLET_B).await, identity);
    assert_eq!(harness.core.merges().await, vec![(other, identity)]);
}

#[tokio::test]
async fn merge_without_pending_request_rejected() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness.post(&mut jar, "/merge-identity/confirm", &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_session_signs_out_with_flash() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let identity = harness.core.create_identity(wallet_profile(WALLET_A)).await;
    let expired = harness.core.access_token(&identity, -60).unwrap();
    let response = harness
        .state
        .sessions()
        .create_user_session(&expired, PASSPORT_URL, "/", "app")
        .unwrap();
    jar.store(&response);

    let response = harness.get(&mut jar, &authorize_uri("openid", &[])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/authenticate/app");
    assert!(!jar.has("_rollup_session_last"));
    assert!(jar.has("_rollup_flash"));

    let landing = json(harness.get(&mut jar, "/authenticate/app").await).await;
    assert_eq!(landing["flash"], "SIGNOUT");
    assert_eq!(landing["authenticated"], false);
    assert!(!jar.has("_rollup_flash"));
}

#[tokio::test]
async fn signout_clears_session() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    harness.login(&mut jar, WALLET_A, "openid").await;

    let response = harness.get(&mut jar, "/signout?client_id=app").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/authenticate/app");
    assert!(!jar.has("_rollup_session_last"));
}

#[tokio::test]
async fn reused_nonce_rejected() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let uri = format!("/authenticate/passport/sign/{WALLET_A}");
    let challenge = json(harness.get(&mut jar, &uri).await).await;
    let nonce = challenge["nonce"].as_str().unwrap().to_string();
    let signature = MemoryCore::signature_for(WALLET_A, &nonce);
    let form = [("nonce", nonce.as_str()), ("signature", signature.as_str())];

    let response = harness.post(&mut jar, &uri, &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = harness.post(&mut jar, &uri, &form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_openapi() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness.get(&mut jar, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let health = json(response).await;
    assert_eq!(health["name"], "passport");
    assert_eq!(health["core"], "ok");

    let doc = json(harness.get(&mut jar, "/api-docs/openapi.json").await).await;
    assert!(doc["paths"]["/authorize"].is_object());
    assert!(doc["paths"]["/merge-identity/confirm"].is_object());
    assert!(doc["paths"]["/authenticate/{client_id}/email/verify"].is_object());
    assert!(doc["components"]["schemas"]["AuthorizeForm"].is_object());
}

#[tokio::test]
async fn merge_cancel_returns_to_the_connecting_client() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    let other = harness.core.create_identity(wallet_profile(WALLET_B)).await;
    harness.login(&mut jar, WALLET_A, "openid").await;

    harness
        .get(&mut jar, &authorize_uri("openid", &[("rollup_action", "connect")]))
        .await;
    let response = harness.sign(&mut jar, "app", WALLET_B).await;
    harness.get(&mut jar, &location(&response)).await;

    let response = harness.get(&mut jar, "/merge-identity/cancel").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let next = location(&response);
    assert!(next.starts_with("/authorize?client_id=app&"));
    assert!(next.contains("rollup_result=CANCEL"));
    assert!(!jar.has("_rollup_identity_merge"));
    assert_eq!(harness.identity_of(WALLET_B).await, other);
}

#[tokio::test]
async fn reconnect_binds_a_fresh_wallet_to_the_session() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    harness.login(&mut jar, WALLET_A, "openid").await;
    let identity = harness.identity_of(WALLET_A).await;

    let reconnect = authorize_uri("openid", &[("rollup_action", "reconnect")]);
    let response = harness.get(&mut jar, &reconnect).await;
    assert_eq!(location(&response), "/authenticate/app?rollup_action=reconnect");

    let response = harness.sign(&mut jar, "app", WALLET_C).await;
    let next = location(&response);
    assert!(next.contains("rollup_result=SUCCESS"), "{next}");
    assert!(!jar.has("_rollup_identity_merge"));
    assert_eq!(harness.identity_of(WALLET_C).await, identity);

    let response = harness.get(&mut jar, &next).await;
    assert_eq!(
        location(&response),
        "https://app.test/callback?rollup_action=reconnect&rollup_result=SUCCESS&state=xyz"
    );
}

#[tokio::test]
async fn already_connected_leaves_bindings_alone() {
    let harness = Harness::new();
    let mut jar = Jar::default();
    let other = harness.core.create_identity(wallet_profile(WALLET_C)).await;
    harness.login(&mut jar, WALLET_A, "openid").await;
    let identity = harness.identity_of(WALLET_A).await;

    harness
        .get(&mut jar, &authorize_uri("openid", &[("rollup_action", "connect")]))
        .await;
    let response = harness.sign(&mut jar, "app", WALLET_A).await;
    assert!(location(&response).contains("rollup_result=ALREADY_CONNECTED_ERROR"));
    assert!(!jar.has("_rollup_identity_merge"));

    assert_eq!(harness.identity_of(WALLET_A).await, identity);
    assert_eq!(harness.identity_of(WALLET_C).await, other);
    assert_eq!(harness.core.get_identity_accounts(&identity).await.unwrap().len(), 1);
    assert_eq!(harness.core.get_identity_accounts(&other).await.unwrap().len(), 1);
    assert!(harness.core.merges().await.is_empty());
}

#[tokio::test]
async fn add_account_returns_to_consent() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let consent = json(
        harness
            .login(&mut jar, WALLET_A, "openid connected_accounts")
            .await,
    )
    .await;
    assert!(consent.get("connectResult").is_none());
    let add = consent["addNewAccountUrl"].as_str().unwrap().to_string();
    assert!(add.contains("rollup_action=addaccount"));

    let response = harness.get(&mut jar, &add).await;
    assert_eq!(location(&response), "/authenticate/app?rollup_action=addaccount");

    let response = harness.sign(&mut jar, "app", WALLET_B).await;
    let next = location(&response);
    assert!(next.contains("rollup_result=SUCCESS"));

    let response = harness.get(&mut jar, &next).await;
    assert_eq!(response.status(), StatusCode::OK);
    let consent = json(response).await;
    assert_eq!(consent["connectResult"], "SUCCESS");
    assert_eq!(consent["state"], "xyz");
    assert_eq!(consent["candidates"]["connectedAccounts"].as_array().unwrap().len(), 2);
    assert_eq!(
        harness.identity_of(WALLET_B).await,
        harness.identity_of(WALLET_A).await
    );
}

#[tokio::test]
async fn smart_contract_wallet_created_on_submit() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let consent = json(harness.login(&mut jar, WALLET_A, "openid erc_4337").await).await;
    assert_eq!(consent["addNewWalletField"], "createSCWallet");
    let identity = harness.identity_of(WALLET_A).await;

    let response = harness
        .post(
            &mut jar,
            "/authorize",
            &[
                ("client_id", "app"),
                ("redirect_uri", APP_REDIRECT),
                ("state", "xyz"),
                ("scopes", "openid erc_4337"),
                ("personaData", "{}"),
                ("createSCWallet", r#"{"nickname":"vault"}"#),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://app.test/callback?code="));

    let accounts = harness.core.get_identity_accounts(&identity).await.unwrap();
    let wallet = accounts
        .iter()
        .find(|account| account.account_type == AccountType::Wallet)
        .unwrap();
    assert_eq!(wallet.title.as_deref(), Some("vault"));

    let persona = harness
        .core
        .get_persona_data(&identity, "app")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        persona.erc_4337,
        Some(ClaimSelection::Accounts(vec![wallet.urn.clone()]))
    );
}

#[tokio::test]
async fn newer_request_replaces_pending_params() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    harness.get(&mut jar, &authorize_uri("openid", &[])).await;
    let newer = authorize_uri("openid", &[]).replace("state=xyz", "state=abc");
    let response = harness.get(&mut jar, &newer).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = harness.sign(&mut jar, "app", WALLET_A).await;
    let next = location(&response);
    assert!(next.contains("state=abc"), "{next}");
    assert!(!next.contains("state=xyz"));

    // same request with a session: nothing to store
    let response = harness.get(&mut jar, &next).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!sets_cookie(&response, "_rollup_client_params_app"));

    let response = harness.get(&mut jar, &authorize_uri("openid", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(sets_cookie(&response, "_rollup_client_params_app"));
    assert_eq!(json(response).await["state"], "xyz");
}

#[tokio::test]
async fn email_code_sign_in_reaches_consent() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness.get(&mut jar, &authorize_uri("openid email", &[])).await;
    assert_eq!(location(&response), "/authenticate/app/account");

    let response = harness
        .post(&mut jar, "/authenticate/app/email", &[("address", "Ada@Example.com")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let challenge = json(response).await;
    assert_eq!(challenge["address"], "ada@example.com");
    let state = challenge["state"].as_str().unwrap().to_string();
    let code = harness.core.email_code("ada@example.com").await.unwrap();

    let verify = "/authenticate/app/email/verify";
    let response = harness
        .post(
            &mut jar,
            verify,
            &[("address", "ada@example.com"), ("code", "xxxxxx"), ("state", state.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!jar.has("_rollup_session_last"));

    let response = harness
        .post(
            &mut jar,
            verify,
            &[("address", "ada@example.com"), ("code", code.as_str()), ("state", state.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(jar.has("_rollup_session_last"));

    let consent = json(harness.get(&mut jar, &location(&response)).await).await;
    let emails = consent["candidates"]["connectedEmails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["address"], "ada@example.com");
    assert_eq!(consent["disableAuthorize"], false);
    assert!(harness
        .core
        .account_identity(&email_account_urn("ada@example.com"))
        .await
        .is_some());
}

#[tokio::test]
async fn malformed_email_rejected() {
    let harness = Harness::new();
    let mut jar = Jar::default();

    let response = harness
        .post(&mut jar, "/authenticate/app/email", &[("address", "not-an-email")])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
