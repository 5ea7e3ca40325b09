//! In-process core used by the test suite and by `--core-url memory://`.
//!
//! Tokens are HS256 JWTs signed with a per-instance key; signatures for
//! wallet challenges are the hex SHA-256 of `address:nonce`. Email codes are
//! not sent anywhere; tests read them back with `MemoryCore::email_code`.

use super::{
    AccountProfile, AccountResolution, AccountType, AppPublicProps, AuthorizationCode,
    AuthorizeRequest, CoreClient, CoreError, EmailOtpRequest, EmailOtpVerifyRequest,
    IdentitySummary, MergePreview, NonceRequest, NonceVerifyRequest, PersonaData,
    Preauthorization, Profile, ScopeDescriptor, ScopeMeta, TokenRequest, TokenSet,
};
use crate::urn::{AccountUrn, IdentityUrn};
use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Write,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::sync::Mutex;
use ulid::Ulid;

pub const NONCE_TTL: Duration = Duration::from_secs(300);
pub const EMAIL_OTP_TTL: Duration = Duration::from_secs(600);
pub const EMAIL_OTP_MAX_ATTEMPTS: u8 = 5;
const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

struct IdentityRecord {
    profile: Option<Profile>,
    accounts: Vec<String>,
}

struct AccountRecord {
    profile: AccountProfile,
    identity: Option<IdentityUrn>,
}

struct PendingNonce {
    address: String,
    issued_at: Instant,
}

struct PendingOtp {
    account: AccountUrn,
    code: String,
    attempts: u8,
    issued_at: Instant,
}

struct IssuedCode {
    identity: IdentityUrn,
    client_id: String,
}

#[derive(Default)]
struct Grant {
    scopes: Vec<BTreeSet<String>>,
    persona: Option<PersonaData>,
}

#[derive(Default)]
struct Inner {
    apps: HashMap<String, AppPublicProps>,
    scopes: ScopeMeta,
    identities: HashMap<IdentityUrn, IdentityRecord>,
    accounts: HashMap<String, AccountRecord>,
    nonces: HashMap<String, PendingNonce>,
    otps: HashMap<String, PendingOtp>,
    outbox: HashMap<String, String>,
    codes: HashMap<String, IssuedCode>,
    grants: HashMap<(IdentityUrn, String), Grant>,
    profile_writes: usize,
    merges: Vec<(IdentityUrn, IdentityUrn)>,
}

impl Inner {
    fn bind(&mut self, identity: &IdentityUrn, account: &AccountUrn) {
        if let Some(record) = self.accounts.get_mut(account.base()) {
            record.identity = Some(identity.clone());
        }
        if let Some(record) = self.identities.get_mut(identity) {
            if !record.accounts.iter().any(|base| base == account.base()) {
                record.accounts.push(account.base().to_string());
            }
        }
    }

    fn new_identity(&mut self) -> IdentityUrn {
        let identity = IdentityUrn::from_id(&Ulid::new().to_string().to_lowercase());
        self.identities.insert(
            identity.clone(),
            IdentityRecord {
                profile: None,
                accounts: Vec::new(),
            },
        );
        identity
    }

    /// Binding for a verified credential. An unbound account joins the
    /// session identity when there is one, otherwise a new identity when
    /// `force` is set.
    fn resolve(
        &mut self,
        account: AccountProfile,
        session: Option<IdentityUrn>,
        force: bool,
    ) -> AccountResolution {
        let urn = account.urn.clone();
        let bound = self
            .accounts
            .entry(urn.base().to_string())
            .or_insert_with(|| AccountRecord {
                profile: account,
                identity: None,
            })
            .identity
            .clone();

        if let Some(identity) = bound {
            return AccountResolution {
                identity_urn: Some(identity),
                existing: true,
            };
        }

        let target = match session.filter(|identity| self.identities.contains_key(identity)) {
            Some(identity) => identity,
            None if force => self.new_identity(),
            None => {
                return AccountResolution {
                    identity_urn: None,
                    existing: false,
                }
            }
        };

        self.bind(&target, &urn);
        AccountResolution {
            identity_urn: Some(target),
            existing: false,
        }
    }

    fn summary(&self, identity: &IdentityUrn) -> Result<IdentitySummary, CoreError> {
        let record = self
            .identities
            .get(identity)
            .ok_or_else(|| CoreError::rpc(404, "identity not found"))?;
        let applications = self.grants.keys().filter(|(i, _)| i == identity).count();
        Ok(IdentitySummary {
            identity_urn: identity.clone(),
            profile: record.profile.clone(),
            accounts: record.accounts.len(),
            applications,
        })
    }
}

pub struct MemoryCore {
    issuer: String,
    secret: Vec<u8>,
    inner: Mutex<Inner>,
}

impl MemoryCore {
    #[must_use]
    pub fn new(issuer: &str) -> Self {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let inner = Inner {
            scopes: default_scopes(),
            ..Inner::default()
        };

        Self {
            issuer: issuer.to_string(),
            secret: secret.into_bytes(),
            inner: Mutex::new(inner),
        }
    }

    #[must_use]
    pub fn with_app(mut self, client_id: &str, app: AppPublicProps) -> Self {
        self.inner.get_mut().apps.insert(client_id.to_string(), app);
        self
    }

    /// Signature the in-memory core accepts for a wallet challenge.
    #[must_use]
    pub fn signature_for(address: &str, nonce: &str) -> String {
        let digest = Sha256::digest(format!("{}:{nonce}", address.to_lowercase()).as_bytes());
        digest.iter().fold(String::new(), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    /// Mint an access token for `identity`; a negative ttl yields an expired token.
    ///
    /// # Errors
    /// Returns an error if the token cannot be encoded.
    pub fn access_token(&self, identity: &IdentityUrn, ttl_seconds: i64) -> Result<String, CoreError> {
        let now = unix_now();
        let claims = Claims {
            sub: identity.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_seconds,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| CoreError::rpc(500, format!("failed to sign token: {e}")))
    }

    fn verified_subject(&self, jwt: &str) -> Result<IdentityUrn, CoreError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(jwt, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| CoreError::rpc(401, format!("invalid token: {e}")))?;
        IdentityUrn::parse(&data.claims.sub).map_err(|e| CoreError::rpc(401, e.to_string()))
    }

    async fn authorized_as(&self, jwt: &str, identity: &IdentityUrn) -> Result<(), CoreError> {
        let subject = self.verified_subject(jwt)?;
        if &subject == identity {
            Ok(())
        } else {
            Err(CoreError::rpc(403, "token subject does not match identity"))
        }
    }

    /// Register an account without binding it.
    pub async fn register_account(&self, account: AccountProfile) {
        let mut inner = self.inner.lock().await;
        inner.accounts.insert(
            account.urn.base().to_string(),
            AccountRecord {
                profile: account,
                identity: None,
            },
        );
    }

    /// Create an identity owning `account`.
    pub async fn create_identity(&self, account: AccountProfile) -> IdentityUrn {
        let urn = account.urn.clone();
        self.register_account(account).await;
        let mut inner = self.inner.lock().await;
        let identity = inner.new_identity();
        inner.bind(&identity, &urn);
        identity
    }

    pub async fn add_account(&self, identity: &IdentityUrn, account: AccountProfile) {
        let urn = account.urn.clone();
        self.register_account(account).await;
        self.inner.lock().await.bind(identity, &urn);
    }

    pub async fn account_identity(&self, account: &AccountUrn) -> Option<IdentityUrn> {
        self.inner
            .lock()
            .await
            .accounts
            .get(account.base())
            .and_then(|record| record.identity.clone())
    }

    pub async fn put_profile(&self, identity: &IdentityUrn, profile: Profile) {
        if let Some(record) = self.inner.lock().await.identities.get_mut(identity) {
            record.profile = Some(profile);
        }
    }

    /// Record a grant as if the user had consented before.
    pub async fn grant(
        &self,
        identity: &IdentityUrn,
        client_id: &str,
        scope: &[&str],
        persona: Option<PersonaData>,
    ) {
        let mut inner = self.inner.lock().await;
        let grant = inner
            .grants
            .entry((identity.clone(), client_id.to_string()))
            .or_default();
        grant.scopes.push(scope.iter().map(ToString::to_string).collect());
        if persona.is_some() {
            grant.persona = persona;
        }
    }

    pub async fn profile_writes(&self) -> usize {
        self.inner.lock().await.profile_writes
    }

    pub async fn merges(&self) -> Vec<(IdentityUrn, IdentityUrn)> {
        self.inner.lock().await.merges.clone()
    }

    /// Last code mailed to `address`.
    pub async fn email_code(&self, address: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .outbox
            .get(&address.to_lowercase())
            .cloned()
    }

    pub async fn identity_exists(&self, identity: &IdentityUrn) -> bool {
        self.inner.lock().await.identities.contains_key(identity)
    }

    fn mint_code(inner: &mut Inner, request: &AuthorizeRequest) -> AuthorizationCode {
        let code = Ulid::new().to_string();
        inner.codes.insert(
            code.clone(),
            IssuedCode {
                identity: request.identity.clone(),
                client_id: request.client_id.clone(),
            },
        );
        AuthorizationCode {
            code,
            state: request.state.clone(),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn default_scopes() -> ScopeMeta {
    let entries = [
        ("openid", "OpenID", "Sign in with your identity", false),
        ("profile", "Profile", "Your display name and picture", false),
        ("email", "Email", "An email address of your choice", false),
        (
            "connected_accounts",
            "Connected Accounts",
            "Accounts connected to your identity",
            false,
        ),
        (
            "erc_4337",
            "Smart Contract Wallets",
            "Smart contract wallets of your choice",
            false,
        ),
        ("system_identifiers", "System Identifiers", "Internal identifiers", true),
    ];
    let scopes = entries
        .into_iter()
        .map(|(key, name, description, hidden)| {
            (
                key.to_string(),
                ScopeDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                    hidden,
                },
            )
        })
        .collect();
    ScopeMeta { scopes }
}

#[async_trait]
impl CoreClient for MemoryCore {
    async fn get_app_public_props(&self, client_id: &str) -> Result<AppPublicProps, CoreError> {
        self.inner
            .lock()
            .await
            .apps
            .get(client_id)
            .cloned()
            .ok_or_else(|| CoreError::rpc(404, format!("unknown client {client_id}")))
    }

    async fn get_scopes(&self) -> Result<ScopeMeta, CoreError> {
        Ok(self.inner.lock().await.scopes.clone())
    }

    async fn preauthorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<Preauthorization, CoreError> {
        let mut inner = self.inner.lock().await;
        let requested: BTreeSet<&String> = request.scope.iter().collect();

        let covered = inner
            .grants
            .get(&(request.identity.clone(), request.client_id.clone()))
            .is_some_and(|grant| {
                grant
                    .scopes
                    .iter()
                    .any(|granted| requested.iter().all(|scope| granted.contains(*scope)))
            });

        if !covered {
            return Ok(Preauthorization::ConsentRequired);
        }

        Ok(Preauthorization::Granted(Self::mint_code(&mut inner, request)))
    }

    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizationCode, CoreError> {
        let mut inner = self.inner.lock().await;

        if !inner.identities.contains_key(&request.identity) {
            return Err(CoreError::rpc(404, "identity not found"));
        }

        let grant = inner
            .grants
            .entry((request.identity.clone(), request.client_id.clone()))
            .or_default();
        grant.scopes.push(request.scope.iter().cloned().collect());
        if request.persona_data.is_some() {
            grant.persona.clone_from(&request.persona_data);
        }

        Ok(Self::mint_code(&mut inner, request))
    }

    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenSet, CoreError> {
        let issued = self
            .inner
            .lock()
            .await
            .codes
            .remove(&request.code)
            .ok_or_else(|| CoreError::rpc(400, "invalid authorization code"))?;

        if issued.client_id != request.client_id {
            return Err(CoreError::rpc(400, "authorization code issued to another client"));
        }

        Ok(TokenSet {
            access_token: self.access_token(&issued.identity, ACCESS_TOKEN_TTL_SECONDS)?,
            refresh_token: Some(Ulid::new().to_string()),
            id_token: None,
        })
    }

    async fn get_profile(&self, identity: &IdentityUrn) -> Result<Option<Profile>, CoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .identities
            .get(identity)
            .and_then(|record| record.profile.clone()))
    }

    async fn set_profile(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        profile: &Profile,
    ) -> Result<(), CoreError> {
        self.authorized_as(jwt, identity).await?;
        let mut inner = self.inner.lock().await;
        let record = inner
            .identities
            .get_mut(identity)
            .ok_or_else(|| CoreError::rpc(404, "identity not found"))?;
        record.profile = Some(profile.clone());
        inner.profile_writes += 1;
        Ok(())
    }

    async fn get_nonce(&self, request: &NonceRequest) -> Result<String, CoreError> {
        if !request.template.contains("{{nonce}}") {
            return Err(CoreError::rpc(400, "template is missing the nonce placeholder"));
        }
        let nonce = Ulid::new().to_string();
        self.inner.lock().await.nonces.insert(
            nonce.clone(),
            PendingNonce {
                address: request.address.to_lowercase(),
                issued_at: Instant::now(),
            },
        );
        Ok(nonce)
    }

    async fn verify_nonce(
        &self,
        request: &NonceVerifyRequest,
    ) -> Result<AccountResolution, CoreError> {
        let mut inner = self.inner.lock().await;

        let pending = inner
            .nonces
            .remove(&request.nonce)
            .ok_or_else(|| CoreError::rpc(400, "invalid nonce"))?;

        if pending.issued_at.elapsed() > NONCE_TTL {
            return Err(CoreError::rpc(400, "nonce expired"));
        }

        let alias = request.account.alias().unwrap_or_default().to_lowercase();
        if alias != pending.address {
            return Err(CoreError::rpc(400, "nonce was issued for another address"));
        }

        if request.signature != Self::signature_for(&pending.address, &request.nonce) {
            return Err(CoreError::rpc(401, "invalid signature"));
        }

        let account = AccountProfile {
            urn: request.account.clone(),
            account_type: AccountType::Eth,
            address: alias,
            title: None,
            icon: None,
        };
        let session = request.jwt.as_deref().and_then(|jwt| self.verified_subject(jwt).ok());
        Ok(inner.resolve(account, session, request.force_account_creation))
    }

    async fn generate_email_otp(&self, request: &EmailOtpRequest) -> Result<String, CoreError> {
        let address = request.address.to_lowercase();
        if request.account.alias() != Some(address.as_str()) {
            return Err(CoreError::rpc(400, "account does not match the email address"));
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let state = Ulid::new().to_string();

        let mut inner = self.inner.lock().await;
        inner.otps.insert(
            state.clone(),
            PendingOtp {
                account: request.account.clone(),
                code: code.clone(),
                attempts: 0,
                issued_at: Instant::now(),
            },
        );
        inner.outbox.insert(address, code);
        Ok(state)
    }

    async fn verify_email_otp(
        &self,
        request: &EmailOtpVerifyRequest,
    ) -> Result<AccountResolution, CoreError> {
        let mut inner = self.inner.lock().await;

        let pending = inner
            .otps
            .get_mut(&request.state)
            .ok_or_else(|| CoreError::rpc(400, "invalid verification state"))?;

        if pending.issued_at.elapsed() > EMAIL_OTP_TTL || pending.attempts >= EMAIL_OTP_MAX_ATTEMPTS {
            inner.otps.remove(&request.state);
            return Err(CoreError::rpc(400, "code expired"));
        }

        if !pending.account.same_account(&request.account) {
            return Err(CoreError::rpc(400, "code was sent to another address"));
        }

        if pending.code != request.code.trim() {
            pending.attempts += 1;
            return Err(CoreError::rpc(401, "invalid code"));
        }

        inner.otps.remove(&request.state);

        let address = request.account.alias().unwrap_or_default().to_string();
        let account = AccountProfile {
            urn: request.account.clone(),
            account_type: AccountType::Email,
            address,
            title: None,
            icon: None,
        };
        let session = request.jwt.as_deref().and_then(|jwt| self.verified_subject(jwt).ok());
        Ok(inner.resolve(account, session, request.force_account_creation))
    }

    async fn link_account(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        account: &AccountUrn,
    ) -> Result<(), CoreError> {
        self.authorized_as(jwt, identity).await?;
        let mut inner = self.inner.lock().await;
        match inner.accounts.get(account.base()) {
            None => return Err(CoreError::rpc(404, "account not found")),
            Some(record) if record.identity.as_ref() == Some(identity) => return Ok(()),
            Some(record) if record.identity.is_some() => {
                return Err(CoreError::rpc(409, "account is already bound"));
            }
            Some(_) => {}
        }
        inner.bind(identity, account);
        Ok(())
    }

    async fn get_identity_accounts(
        &self,
        identity: &IdentityUrn,
    ) -> Result<Vec<AccountProfile>, CoreError> {
        let inner = self.inner.lock().await;
        let record = inner
            .identities
            .get(identity)
            .ok_or_else(|| CoreError::rpc(404, "identity not found"))?;
        Ok(record
            .accounts
            .iter()
            .filter_map(|base| inner.accounts.get(base))
            .map(|account| account.profile.clone())
            .collect())
    }

    async fn get_account_profile(&self, account: &AccountUrn) -> Result<AccountProfile, CoreError> {
        self.inner
            .lock()
            .await
            .accounts
            .get(account.base())
            .map(|record| record.profile.clone())
            .ok_or_else(|| CoreError::rpc(404, "account not found"))
    }

    async fn get_persona_data(
        &self,
        identity: &IdentityUrn,
        client_id: &str,
    ) -> Result<Option<PersonaData>, CoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .grants
            .get(&(identity.clone(), client_id.to_string()))
            .and_then(|grant| grant.persona.clone()))
    }

    async fn init_smart_contract_wallet(
        &self,
        jwt: &str,
        identity: &IdentityUrn,
        nickname: &str,
    ) -> Result<AccountUrn, CoreError> {
        self.authorized_as(jwt, identity).await?;
        let id = Ulid::new().to_string().to_lowercase();
        let address = format!("0x{}", &MemoryCore::signature_for(&id, nickname)[..40]);
        let urn = AccountUrn::componentized(&id, "crypto", "wallet", &address);
        let mut inner = self.inner.lock().await;
        inner.accounts.insert(
            urn.base().to_string(),
            AccountRecord {
                profile: AccountProfile {
                    urn: urn.clone(),
                    account_type: AccountType::Wallet,
                    address,
                    title: Some(nickname.to_string()),
                    icon: None,
                },
                identity: None,
            },
        );
        inner.bind(identity, &urn);
        Ok(urn)
    }

    async fn is_account_valid(&self, jwt: &str) -> Result<bool, CoreError> {
        let Ok(identity) = self.verified_subject(jwt) else {
            return Ok(false);
        };
        Ok(self.identity_exists(&identity).await)
    }

    async fn merge_preview(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<MergePreview, CoreError> {
        self.authorized_as(jwt, target).await?;
        let inner = self.inner.lock().await;
        Ok(MergePreview {
            source: inner.summary(source)?,
            target: inner.summary(target)?,
        })
    }

    async fn merge_identities(
        &self,
        jwt: &str,
        source: &IdentityUrn,
        target: &IdentityUrn,
    ) -> Result<(), CoreError> {
        self.authorized_as(jwt, target).await?;
        let mut inner = self.inner.lock().await;

        if source == target {
            return Err(CoreError::rpc(400, "cannot merge an identity into itself"));
        }

        let moved = inner
            .identities
            .remove(source)
            .ok_or_else(|| CoreError::rpc(404, "source identity not found"))?;

        for base in &moved.accounts {
            let urn = inner.accounts.get(base).map(|record| record.profile.urn.clone());
            if let Some(urn) = urn {
                inner.bind(target, &urn);
            }
        }

        inner.merges.push((source.clone(), target.clone()));
        Ok(())
    }
}
