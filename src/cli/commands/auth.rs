use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

/// Auth and mail related arguments resolved from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub mail_from: String,
}

impl Options {
    /// Extract the auth options from validated matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a defaulted argument is somehow absent.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .context("missing argument: --session-ttl-seconds")?,
            reset_token_ttl_seconds: matches
                .get_one::<i64>("reset-token-ttl-seconds")
                .copied()
                .context("missing argument: --reset-token-ttl-seconds")?,
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing argument: --frontend-base-url")?,
            mail_from: matches
                .get_one::<String>("mail-from")
                .cloned()
                .context("missing argument: --mail-from")?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    with_session_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("Secret used to sign session tokens")
                .env("INSIGHT_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("cookie-secret")
                .long("cookie-secret")
                .help("Secret used to sign the session cookie (independent of the token secret)")
                .env("INSIGHT_COOKIE_SECRET")
                .required(true),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token and cookie TTL in seconds")
                .env("INSIGHT_SESSION_TTL_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("INSIGHT_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for password reset links")
                .env("INSIGHT_FRONTEND_BASE_URL")
                .default_value("http://localhost:8000"),
        )
        .arg(
            Arg::new("mail-from")
                .long("mail-from")
                .help("From address for outbound mail")
                .env("INSIGHT_MAIL_FROM")
                .default_value("no-reply@insight-crm.dev"),
        )
}
