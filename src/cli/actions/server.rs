use crate::{
    cli::telemetry,
    core::{http::HttpCoreClient, memory::MemoryCore, CoreClient},
    passport::{
        self,
        state::{PassportConfig, PassportState},
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// Core URL that selects the in-process core.
pub const MEMORY_CORE_URL: &str = "memory://";

pub struct Args {
    pub port: u16,
    pub core_url: String,
    pub passport_url: String,
    pub console_url: String,
    pub session_secret: String,
    pub cookie_domain: Option<String>,
    pub session_ttl_seconds: u64,
    pub merge_ttl_seconds: u64,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("core_url", &self.core_url)
            .field("passport_url", &self.passport_url)
            .field("console_url", &self.console_url)
            .field("cookie_domain", &self.cookie_domain)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("merge_ttl_seconds", &self.merge_ttl_seconds)
            .finish_non_exhaustive()
    }
}

fn core_client(core_url: &str, issuer: &str) -> Result<Arc<dyn CoreClient>> {
    if core_url == MEMORY_CORE_URL {
        warn!("using the in-memory core, state is lost on restart");
        return Ok(Arc::new(MemoryCore::new(issuer)));
    }

    let client = HttpCoreClient::new(core_url)
        .with_context(|| format!("failed to build core client for {core_url}"))?;
    Ok(Arc::new(client))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the core client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("server args: {:?}", args);

    let config = PassportConfig::new(
        &args.passport_url,
        &args.console_url,
        SecretString::from(args.session_secret),
    )
    .with_cookie_domain(args.cookie_domain)
    .with_session_ttl_seconds(args.session_ttl_seconds)
    .with_merge_ttl_seconds(args.merge_ttl_seconds);

    let core = core_client(&args.core_url, config.issuer())?;

    info!("passport {} using core at {}", config.issuer(), args.core_url);

    let state = Arc::new(PassportState::new(config, core));

    let result = passport::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}
