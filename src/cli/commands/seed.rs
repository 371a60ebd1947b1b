use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::seed::RemintPolicy;

/// Session, remember-me and rotation options.
#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub remember_me_ttl_seconds: i64,
    pub remint_policy: RemintPolicy,
    pub cookie_secure: bool,
    pub bootstrap_users: u32,
    pub sweep_interval_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let session_ttl_seconds = positive(matches, "session-ttl-seconds", 43_200)?;
        let remember_me_ttl_seconds = positive(matches, "remember-me-ttl-seconds", 1_209_600)?;
        let sweep_interval_seconds = positive(matches, "sweep-interval-seconds", 60)?;
        Ok(Self {
            session_ttl_seconds,
            remember_me_ttl_seconds,
            remint_policy: matches
                .get_one::<RemintPolicy>("remint-policy")
                .copied()
                .unwrap_or_default(),
            cookie_secure: matches.get_flag("cookie-secure"),
            bootstrap_users: matches
                .get_one::<u32>("bootstrap-users")
                .copied()
                .unwrap_or(0),
            sweep_interval_seconds,
        })
    }
}

fn positive(matches: &ArgMatches, id: &str, default: i64) -> Result<i64> {
    let value = matches.get_one::<i64>(id).copied().unwrap_or(default);
    if value > 0 {
        Ok(value)
    } else {
        Err(anyhow!("--{id} must be positive, got {value}"))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("bootstrap-users")
                .long("bootstrap-users")
                .help("Create principals user_0..user_{N-1} whose password is their id")
                .env("SEEDGATE_BOOTSTRAP_USERS")
                .default_value("0")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("SEEDGATE_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("remember-me-ttl-seconds")
                .long("remember-me-ttl-seconds")
                .help("Remember-me token TTL in seconds, renewed on every redemption")
                .env("SEEDGATE_REMEMBER_ME_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("sweep-interval-seconds")
                .long("sweep-interval-seconds")
                .help("How often expired sessions and remember-me tokens are purged")
                .env("SEEDGATE_SWEEP_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("remint-policy")
                .long("remint-policy")
                .help("What happens to the caller's own session when it rotates its seed")
                .env("SEEDGATE_REMINT_POLICY")
                .default_value("keep-initiator")
                .value_parser(|value: &str| value.parse::<RemintPolicy>()),
        )
        .arg(
            Arg::new("cookie-secure")
                .long("cookie-secure")
                .help("Mark cookies Secure (serve over HTTPS)")
                .env("SEEDGATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}
