use super::{
    consent::{ConsentData, ConsentInput},
    params::{
        is_first_party, parse_scope, validate_redirect_uri, AuthorizeQuery, AuthzParams, Prompt,
        RollupAction, RollupResult, CONSOLE_CLIENT_ID,
    },
};
use crate::{
    core::{
        AppPublicProps, AuthorizeRequest, ClaimSelection, PersonaData, Preauthorization, ScopeMeta,
    },
    error::PassportError,
    passport::state::RequestContext,
    persona::{get_data_for_scopes, resolve_persona_claims, validate_persona_data, ERC_4337_SCOPE},
    session::{
        append_cookies, authenticate_redirect, redirect_with_cookies, validated_session_context,
        SessionContext, ValidatedSession,
    },
    urn::IdentityUrn,
};
use axum::{
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;
use utoipa::ToSchema;

fn authorize_request(
    params: &AuthzParams,
    identity: &IdentityUrn,
    persona_data: Option<PersonaData>,
) -> AuthorizeRequest {
    AuthorizeRequest {
        identity: identity.clone(),
        client_id: params.client_id.clone(),
        redirect_uri: params.redirect_uri.clone(),
        scope: params.scope.clone(),
        state: params.state.clone(),
        response_type: "code".to_string(),
        persona_data,
    }
}

/// Redirect to `target` with `pairs` appended, clearing the client's params.
fn terminal_redirect(
    ctx: &RequestContext,
    client_id: &str,
    mut target: Url,
    pairs: &[(&str, &str)],
) -> Result<Response, PassportError> {
    // query_pairs_mut would leave a bare `?` behind
    if !pairs.is_empty() {
        target.query_pairs_mut().extend_pairs(pairs);
    }
    let cookies = ctx.sessions().clear_authz_params(client_id)?;
    Ok(redirect_with_cookies(target.as_str(), cookies))
}

fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    append_cookies(&mut response, cookies);
    response
}

/// Registered redirect for first-party clients.
fn first_party_redirect(ctx: &RequestContext, client_id: &str) -> String {
    if client_id == CONSOLE_CLIENT_ID {
        ctx.config().console_url().to_string()
    } else {
        ctx.config().passport_redirect_url()
    }
}

/// GET `/authorize`.
///
/// # Errors
/// `BadRequest` for invalid parameters, otherwise core failures.
#[instrument(skip(ctx, query), fields(client_id = query.client_id.as_deref().unwrap_or_default()))]
pub async fn authorize(ctx: &RequestContext, query: AuthorizeQuery) -> Result<Response, PassportError> {
    let client_id = query.client_id()?.to_string();
    let rollup_result = query.rollup_result()?;

    if is_first_party(&client_id) {
        return first_party(ctx, &client_id, &query, rollup_result).await;
    }

    let (app, scope_meta) = tokio::try_join!(
        ctx.core().get_app_public_props(&client_id),
        ctx.core().get_scopes()
    )?;

    let mut params = query.validate(&app)?;

    // Back from an add-account round trip: resume consent.
    let connect_result = if params.rollup_action == Some(RollupAction::AddAccount) {
        let result = rollup_result;
        if result.is_some() {
            params.rollup_action = None;
        }
        result
    } else {
        None
    };

    // A different pending request for this client supersedes the stored one.
    let stored = ctx.sessions().authz_params(ctx.headers(), Some(&client_id));
    let cookies = if stored.as_ref() == Some(&params) {
        Vec::new()
    } else {
        debug!("storing authorization params for {}", client_id);
        ctx.sessions().save_authz_params(&params)?
    };

    if let Some(action) = params.rollup_action.as_ref().filter(|a| a.is_connect()) {
        let Some(result) = rollup_result else {
            return authenticate_redirect(ctx, &params);
        };
        let target = validate_redirect_uri(&params.redirect_uri, &app.redirect_uri)?;
        let action = action.to_string();
        info!("{} finished with {}", action, result.as_str());
        return terminal_redirect(
            ctx,
            &client_id,
            target,
            &[
                ("rollup_action", action.as_str()),
                ("rollup_result", result.as_str()),
                ("state", params.state.as_str()),
            ],
        );
    }

    let session = match validated_session_context(ctx, &params).await? {
        SessionContext::Valid(session) => session,
        SessionContext::Redirect(response) => return Ok(with_cookies(response, cookies)),
    };

    if params.prompt != Some(Prompt::Consent) && connect_result.is_none() {
        let request = authorize_request(&params, &session.identity_urn, None);
        if let Preauthorization::Granted(code) = ctx.core().preauthorize(&request).await? {
            info!("preauthorized {} for {}", session.identity_urn, client_id);
            let target = validate_redirect_uri(&params.redirect_uri, &app.redirect_uri)?;
            return terminal_redirect(
                ctx,
                &client_id,
                target,
                &[("code", code.code.as_str()), ("state", code.state.as_str())],
            );
        }
    }

    let consent = consent(ctx, params, app, scope_meta, &session, connect_result).await?;
    Ok(with_cookies(Json(consent).into_response(), cookies))
}

async fn consent(
    ctx: &RequestContext,
    params: AuthzParams,
    app: AppPublicProps,
    scope_meta: ScopeMeta,
    session: &ValidatedSession,
    connect_result: Option<RollupResult>,
) -> Result<ConsentData, PassportError> {
    let identity = &session.identity_urn;

    // Profile first; persona resolution reads from the same identity.
    let profile = ctx
        .core()
        .get_profile(identity)
        .await?
        .ok_or_else(|| PassportError::internal(format!("no profile for {identity}")))?;

    let candidates =
        get_data_for_scopes(ctx.core(), &params.scope, identity, &params.client_id).await?;

    let selected = match &candidates.persona_data {
        Some(persona) => resolve_persona_claims(ctx.core(), identity, &params.scope, persona).await?,
        None => Default::default(),
    };

    Ok(ConsentData::build(ConsentInput {
        params,
        app,
        scope_meta,
        profile,
        candidates,
        selected,
        connect_result,
    }))
}

/// `passport` and `console` skip scopes and consent.
async fn first_party(
    ctx: &RequestContext,
    client_id: &str,
    query: &AuthorizeQuery,
    rollup_result: Option<RollupResult>,
) -> Result<Response, PassportError> {
    let registered = first_party_redirect(ctx, client_id);
    let redirect_uri = query
        .redirect_uri
        .as_deref()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .unwrap_or(&registered);
    let target = validate_redirect_uri(redirect_uri, &registered)?;

    let params = AuthzParams {
        client_id: client_id.to_string(),
        redirect_uri: target.to_string(),
        state: query
            .state
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "skip".to_string()),
        scope: Vec::new(),
        prompt: None,
        rollup_action: query.rollup_action()?,
        login_hint: query.login_hint.clone(),
    };

    let connect = params.rollup_action.as_ref().filter(|a| a.is_connect());

    if connect.is_some() && rollup_result.is_none() {
        return authenticate_redirect(ctx, &params);
    }

    if let SessionContext::Redirect(response) = validated_session_context(ctx, &params).await? {
        return Ok(response);
    }

    let action = connect.map(ToString::to_string);
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    if let Some(result) = rollup_result {
        if let Some(action) = &action {
            pairs.push(("rollup_action", action.as_str()));
        }
        pairs.push(("rollup_result", result.as_str()));
    }

    terminal_redirect(ctx, client_id, target, &pairs)
}

/// POST `/authorize` form.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct AuthorizeForm {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub scopes: Option<String>,
    #[serde(rename = "personaData")]
    pub persona_data: Option<String>,
    #[serde(rename = "createSCWallet")]
    pub create_sc_wallet: Option<String>,
    pub cancel: Option<String>,
}

#[derive(Deserialize)]
struct CreateWallet {
    nickname: String,
}

fn form_field<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, PassportError> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PassportError::bad_request(format!("{name} is required")))
}

/// POST `/authorize`: consent submitted or cancelled.
///
/// # Errors
/// `BadRequest`/`Unauthorized` for invalid submissions, otherwise core failures.
#[instrument(skip(ctx, form), fields(client_id = form.client_id.as_deref().unwrap_or_default()))]
pub async fn submit(ctx: &RequestContext, form: AuthorizeForm) -> Result<Response, PassportError> {
    let client_id = form_field(form.client_id.as_ref(), "client_id")?;
    let app = ctx.core().get_app_public_props(client_id).await?;

    if let Some(cancel) = form.cancel.as_deref().filter(|c| !c.trim().is_empty()) {
        let target = validate_redirect_uri(cancel.trim(), &app.redirect_uri)?;
        let has = |key: &str| target.query_pairs().any(|(k, _)| k == key);
        let mut pairs = Vec::new();
        if !has("error") {
            pairs.push(("error", "access_denied"));
        }
        let state = form.state.clone().unwrap_or_default();
        if !has("state") && !state.is_empty() {
            pairs.push(("state", state.as_str()));
        }
        info!("user cancelled authorization for {}", client_id);
        return terminal_redirect(ctx, client_id, target, &pairs);
    }

    let redirect_uri = form_field(form.redirect_uri.as_ref(), "redirect_uri")?;
    let target = validate_redirect_uri(redirect_uri, &app.redirect_uri)?;

    let params = AuthzParams {
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
        state: form_field(form.state.as_ref(), "state")?.to_string(),
        scope: parse_scope(form.scopes.as_deref().unwrap_or_default()),
        prompt: None,
        rollup_action: None,
        login_hint: None,
    };

    let session = match validated_session_context(ctx, &params).await? {
        SessionContext::Valid(session) => session,
        SessionContext::Redirect(response) => return Ok(response),
    };

    let mut persona: PersonaData = match form.persona_data.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw)
            .map_err(|e| PassportError::bad_request(format!("invalid personaData: {e}")))?,
        _ => PersonaData::default(),
    };

    validate_persona_data(ctx.core(), &session.identity_urn, &persona).await?;

    let wants_wallet = params.scope.iter().any(|s| s == ERC_4337_SCOPE);
    let wallet_selected = persona.erc_4337.as_ref().is_some_and(|s| !s.is_empty());
    if wants_wallet && !wallet_selected {
        if let Some(raw) = form.create_sc_wallet.as_deref().filter(|r| !r.trim().is_empty()) {
            let CreateWallet { nickname } = serde_json::from_str(raw)
                .map_err(|e| PassportError::bad_request(format!("invalid createSCWallet: {e}")))?;
            let wallet = ctx
                .core()
                .init_smart_contract_wallet(&session.jwt, &session.identity_urn, &nickname)
                .await?;
            info!("created smart contract wallet {} for {}", wallet, session.identity_urn);
            persona.erc_4337 = Some(ClaimSelection::Accounts(vec![wallet]));
        }
    }

    let persona_data = (!persona.is_empty()).then_some(persona);
    let code = ctx
        .core()
        .authorize(&authorize_request(&params, &session.identity_urn, persona_data))
        .await?;

    info!("authorized {} for {}", session.identity_urn, client_id);

    terminal_redirect(
        ctx,
        client_id,
        target,
        &[("code", code.code.as_str()), ("state", code.state.as_str())],
    )
}
