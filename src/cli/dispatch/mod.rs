//! Map validated CLI matches to the action the binary executes.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::seed;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an option is out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());

    let seed_opts = seed::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        bootstrap_users: seed_opts.bootstrap_users,
        session_ttl_seconds: seed_opts.session_ttl_seconds,
        remember_me_ttl_seconds: seed_opts.remember_me_ttl_seconds,
        remint_policy: seed_opts.remint_policy,
        cookie_secure: seed_opts.cookie_secure,
        sweep_interval_seconds: seed_opts.sweep_interval_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::RemintPolicy;

    #[test]
    fn empty_dsn_means_in_memory() {
        temp_env::with_vars([("SEEDGATE_DSN", Some("  "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["seedgate"]);
            let result = handler(&matches);
            assert!(matches!(result, Ok(Action::Server(Args { dsn: None, .. }))));
        });
    }

    #[test]
    fn maps_seed_options() {
        temp_env::with_vars(
            [
                ("SEEDGATE_REMINT_POLICY", Some("logout-everywhere")),
                ("SEEDGATE_SESSION_TTL_SECONDS", Some("10")),
                ("SEEDGATE_SWEEP_INTERVAL_SECONDS", Some("5")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["seedgate"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };
                assert_eq!(args.remint_policy, RemintPolicy::LogoutEverywhere);
                assert_eq!(args.session_ttl_seconds, 10);
                assert_eq!(args.sweep_interval_seconds, 5);
            },
        );
    }

    #[test]
    fn rejects_non_positive_ttl() {
        temp_env::with_vars([("SEEDGATE_REMEMBER_ME_TTL_SECONDS", Some("0"))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["seedgate"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--remember-me-ttl-seconds"));
            }
        });
    }
}
