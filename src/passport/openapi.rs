use super::handlers::{authenticate, authorize, email, health, merge, signout};
use crate::authorize::{consent::ConsentData, AuthorizeForm};
use crate::email::EmailChallenge;
use crate::nonce::NonceChallenge;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        authorize::authorize_get,
        authorize::authorize_post,
        authenticate::landing,
        authenticate::challenge,
        authenticate::sign,
        email::send_code,
        email::verify_code,
        merge::prompt,
        merge::preview,
        merge::confirm,
        merge::cancel,
        signout::signout,
    ),
    components(schemas(
        health::Health,
        ConsentData,
        NonceChallenge,
        EmailChallenge,
        AuthorizeForm,
        authenticate::AuthenticateLanding,
        authenticate::SignForm,
        email::EmailForm,
        email::EmailVerifyForm,
        merge::MergePrompt,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "authorize", description = "OAuth authorization"),
        (name = "authenticate", description = "Sign-in and sessions"),
        (name = "merge", description = "Identity merge challenge"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
