//! Auth configuration, the session registry, and the shared handler state.

use dashmap::DashMap;
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info};

use crate::seed::{Credential, SeedError, SeedGate, hash_token_secret, random_token, unix_now};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    cookie_secure: bool,
    sweep_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: false,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// How often [`spawn_sweeper`] purges expired sessions and series.
    #[must_use]
    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

struct SessionEntry {
    credential: Credential,
    expires_at_unix: i64,
}

/// Open sessions keyed by the SHA-256 hash of their cookie token.
///
/// The registry only maps tokens to credentials; whether a credential is still
/// good is decided by the seed gate on every lookup.
pub struct SessionRegistry {
    ttl_seconds: i64,
    sessions: DashMap<Vec<u8>, SessionEntry>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            sessions: DashMap::new(),
        }
    }

    /// Register `credential` under a new random token and return the raw token.
    ///
    /// # Errors
    /// [`SeedError::EntropySourceUnavailable`] if no token can be generated.
    pub fn open(&self, credential: Credential) -> Result<String, SeedError> {
        let token = random_token()?;
        self.sessions.insert(
            hash_token_secret(&token),
            SessionEntry {
                credential,
                expires_at_unix: unix_now().saturating_add(self.ttl_seconds),
            },
        );
        Ok(token)
    }

    /// Credential behind `token`; expired entries are dropped on sight.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<Credential> {
        let key = hash_token_secret(token);
        let entry = self.sessions.get(&key)?;
        if entry.expires_at_unix > unix_now() {
            return Some(entry.credential.clone());
        }
        // Release the shard read lock before removing.
        drop(entry);
        debug!("Dropping expired session");
        self.sessions.remove(&key);
        None
    }

    /// Swap the credential behind an open session, keeping its expiry.
    pub fn replace(&self, token: &str, credential: Credential) -> bool {
        match self.sessions.get_mut(&hash_token_secret(token)) {
            Some(mut entry) => {
                entry.credential = credential;
                true
            }
            None => false,
        }
    }

    /// Drop every expired session, resolved or not; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = unix_now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at_unix > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn close(&self, token: &str) -> Option<Credential> {
        self.sessions
            .remove(&hash_token_secret(token))
            .map(|(_, entry)| entry.credential)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct AuthState {
    config: AuthConfig,
    gate: Arc<SeedGate>,
    sessions: SessionRegistry,
    pool: Option<PgPool>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, gate: Arc<SeedGate>, pool: Option<PgPool>) -> Self {
        let sessions = SessionRegistry::new(config.session_ttl_seconds());
        Self {
            config,
            gate,
            sessions,
            pool,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn gate(&self) -> &SeedGate {
        &self.gate
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Purge expired sessions and remember-me series once.
    ///
    /// # Errors
    /// Storage errors from the series store; sessions are purged regardless.
    pub async fn sweep_expired(&self) -> Result<(usize, u64), SeedError> {
        let sessions = self.sessions.purge_expired();
        let series = self.gate.purge_expired_remember_me().await?;
        Ok((sessions, series))
    }
}

/// Run [`AuthState::sweep_expired`] every [`AuthConfig::sweep_interval`].
pub fn spawn_sweeper(state: Arc<AuthState>) -> JoinHandle<()> {
    let mut sweep_interval = interval(state.config().sweep_interval());

    tokio::spawn(async move {
        loop {
            sweep_interval.tick().await;

            match state.sweep_expired().await {
                Ok((0, 0)) => {}
                Ok((sessions, series)) => {
                    info!(sessions, series, "Purged expired credentials");
                }
                Err(err) => error!("Failed to purge expired remember-me series: {err}"),
            }
        }
    })
}
