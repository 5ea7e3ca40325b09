pub mod logging;
pub mod session;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("passport")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("PASSPORT_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("core-url")
                .long("core-url")
                .help("Identity core RPC base URL")
                .long_help(
                    "Identity core RPC base URL, example: https://core.tld/. Use memory:// to run against an in-process core.",
                )
                .env("PASSPORT_CORE_URL")
                .required(true),
        )
        .arg(
            Arg::new("passport-url")
                .long("passport-url")
                .help("Public base URL of this service, also the token issuer")
                .env("PASSPORT_URL")
                .required(true),
        )
        .arg(
            Arg::new("console-url")
                .long("console-url")
                .help("Developer console URL, default landing for console logins")
                .env("PASSPORT_CONSOLE_URL")
                .required(true),
        );

    let command = session::with_args(command);
    logging::with_args(command)
}
