//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::session;
use anyhow::{Context, Result};
use url::Url;

fn required_url(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    let value = matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))?;
    Url::parse(&value).with_context(|| format!("invalid URL for --{name}: {value}"))?;
    Ok(value)
}

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let core_url = required_url(matches, "core-url")?;
    let passport_url = required_url(matches, "passport-url")?;
    let console_url = required_url(matches, "console-url")?;

    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        core_url,
        passport_url,
        console_url,
        session_secret: session_opts.session_secret,
        cookie_domain: session_opts.cookie_domain,
        session_ttl_seconds: session_opts.session_ttl_seconds,
        merge_ttl_seconds: session_opts.merge_ttl_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn vars(secret: &str) -> [(&'static str, Option<String>); 5] {
        [
            ("PASSPORT_CORE_URL", Some("memory://".to_string())),
            ("PASSPORT_URL", Some("https://passport.rollup.test".to_string())),
            (
                "PASSPORT_CONSOLE_URL",
                Some("https://console.rollup.test".to_string()),
            ),
            ("PASSPORT_SESSION_SECRET", Some(secret.to_string())),
            ("PASSPORT_COOKIE_DOMAIN", None),
        ]
    }

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(vars(SECRET), || {
            let matches = commands::new().get_matches_from(vec!["passport"]);
            let action = handler(&matches).unwrap();
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.core_url, "memory://");
            assert_eq!(args.passport_url, "https://passport.rollup.test");
            assert_eq!(args.session_ttl_seconds, 7_776_000);
            assert_eq!(args.merge_ttl_seconds, 300);
            assert!(args.cookie_domain.is_none());
        });
    }

    #[test]
    fn short_session_secret_rejected() {
        temp_env::with_vars(vars("too-short"), || {
            let matches = commands::new().get_matches_from(vec!["passport"]);
            let err = handler(&matches).unwrap_err();
            assert!(err.to_string().contains("at least 32 bytes"));
        });
    }

    #[test]
    fn invalid_passport_url_rejected() {
        temp_env::with_vars(vars(SECRET), || {
            let matches = commands::new().get_matches_from(vec![
                "passport",
                "--passport-url",
                "not a url",
            ]);
            let err = handler(&matches).unwrap_err();
            assert!(err.to_string().contains("--passport-url"));
        });
    }
}
