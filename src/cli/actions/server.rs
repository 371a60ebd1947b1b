use crate::{
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState},
    },
    cli::telemetry,
    seed::{self, PrincipalId, RemintPolicy, SeedConfig, SeedGate},
};
use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub bootstrap_users: u32,
    pub session_ttl_seconds: i64,
    pub remember_me_ttl_seconds: i64,
    pub remint_policy: RemintPolicy,
    pub cookie_secure: bool,
    pub sweep_interval_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot be
/// applied, bootstrap principals cannot be created, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let seed_config = SeedConfig::new()
        .with_remember_me_ttl_seconds(args.remember_me_ttl_seconds)
        .with_remint_policy(args.remint_policy);

    let (gate, pool) = match &args.dsn {
        Some(dsn) => {
            let pool = connect(dsn).await?;
            (SeedGate::postgres(&pool, &seed_config), Some(pool))
        }
        None => {
            info!("No DSN configured, using in-memory stores");
            (SeedGate::in_memory(&seed_config), None)
        }
    };

    bootstrap(&gate, args.bootstrap_users).await?;

    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_cookie_secure(args.cookie_secure)
        .with_sweep_interval(Duration::from_secs(
            args.sweep_interval_seconds.unsigned_abs(),
        ));
    let auth_state = Arc::new(AuthState::new(auth_config, Arc::new(gate), pool));

    let result = api::new(args.port, auth_state).await;
    telemetry::shutdown_tracer();
    result
}

async fn connect(dsn: &str) -> Result<PgPool> {
    info!("Connecting to database: {}", redact_dsn(dsn));

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    seed::apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    Ok(pool)
}

/// Create `user_0..user_{count-1}`, each with its id as password.
async fn bootstrap(gate: &SeedGate, count: u32) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let mut created = 0_u32;
    for index in 0..count {
        let name = format!("user_{index}");
        let principal = PrincipalId::new(name.as_str());
        if gate
            .create_principal(&principal, &name)
            .await
            .with_context(|| format!("Failed to create principal {name}"))?
        {
            created += 1;
        }
    }
    info!(requested = count, created, "Bootstrapped principals");
    Ok(())
}

/// Strip the password from a DSN before it is logged.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<unparseable dsn>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_dsn_hides_password() {
        assert_eq!(
            redact_dsn("postgres://seed:hunter2@db:5432/seedgate"),
            "postgres://seed:****@db:5432/seedgate"
        );
        assert_eq!(
            redact_dsn("postgres://db/seedgate"),
            "postgres://db/seedgate"
        );
        assert_eq!(redact_dsn("not a url"), "<unparseable dsn>");
    }

    #[tokio::test]
    async fn bootstrap_creates_benchmark_principals() -> Result<()> {
        let gate = SeedGate::in_memory(&SeedConfig::new());
        bootstrap(&gate, 3).await?;
        for index in 0..3 {
            let name = format!("user_{index}");
            assert!(gate.authenticate(&PrincipalId::new(name.as_str()), &name).await?);
        }
        let missing = PrincipalId::from("user_3");
        assert!(!gate.principal_exists(&missing).await?);
        // Idempotent.
        bootstrap(&gate, 3).await?;
        Ok(())
    }
}
