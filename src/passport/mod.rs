pub mod handlers;
mod openapi;
pub mod state;

pub use openapi::openapi;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Json, Router,
};
use handlers::{authenticate, authorize, email, health, merge, signout};
use state::PassportState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Build the router with every route and the request-id/trace layers.
#[must_use]
pub fn router(state: Arc<PassportState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/authenticate/:client_id", get(authenticate::landing))
        .route("/authenticate/:client_id/account", get(authenticate::landing))
        .route(
            "/authenticate/:client_id/sign/:address",
            get(authenticate::challenge).post(authenticate::sign),
        )
        .route("/authenticate/:client_id/email", post(email::send_code))
        .route("/authenticate/:client_id/email/verify", post(email::verify_code))
        .route("/merge-identity/prompt", get(merge::prompt))
        .route(
            "/merge-identity/confirm",
            get(merge::preview).post(merge::confirm),
        )
        .route("/merge-identity/cancel", get(merge::cancel))
        .route("/signout", get(signout::signout))
        .route("/api-docs/openapi.json", get(|| async { Json(openapi()) }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<PassportState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
