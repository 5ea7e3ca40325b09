use clap::{Arg, Command};

/// Shortest accepted cookie signing secret, in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-secret")
                .long("session-secret")
                .help("Secret used to sign session cookies (at least 32 bytes)")
                .env("PASSPORT_SESSION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("cookie-domain")
                .long("cookie-domain")
                .help("Domain attribute for session cookies")
                .env("PASSPORT_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("User session cookie TTL in seconds")
                .env("PASSPORT_SESSION_TTL_SECONDS")
                .default_value("7776000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("merge-ttl-seconds")
                .long("merge-ttl-seconds")
                .help("Pending identity merge TTL in seconds")
                .env("PASSPORT_MERGE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub session_secret: String,
    pub cookie_domain: Option<String>,
    pub session_ttl_seconds: u64,
    pub merge_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the secret is missing or too short.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        let session_secret = matches
            .get_one::<String>("session-secret")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --session-secret"))?;

        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "--session-secret must be at least {MIN_SESSION_SECRET_LEN} bytes"
            ));
        }

        Ok(Self {
            session_secret,
            cookie_domain: matches
                .get_one::<String>("cookie-domain")
                .cloned()
                .filter(|domain| !domain.is_empty()),
            session_ttl_seconds: matches
                .get_one::<u64>("session-ttl-seconds")
                .copied()
                .unwrap_or(7_776_000),
            merge_ttl_seconds: matches
                .get_one::<u64>("merge-ttl-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}
