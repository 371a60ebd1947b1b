//! Seed lifecycle and the credential gate built on it.
//!
//! Flow Overview:
//! - login: [`CredentialMinter`] reads the principal's current seed once and
//!   stamps it into the issued [`Credential`];
//! - every request: [`CredentialValidator`] compares the embedded copy with the
//!   current seed in constant time and rejects on mismatch;
//! - revocation: [`SeedRotator`] replaces the seed, which kills every credential
//!   minted before it without locating any of them.
//!
//! [`SeedGate`] wires the pieces together over injectable stores.

mod credential;
mod directory;
mod error;
mod generator;
mod minter;
mod remember_me;
mod rotator;
mod store;
mod types;
mod validator;

pub use credential::{Credential, CredentialKind, RememberMeToken};
pub use directory::{MemoryDirectory, PgDirectory, PrincipalDirectory};
pub use error::{Rejection, SeedError};
pub use generator::{OsSeedGenerator, SEED_BYTES, SeedGenerator, random_token};
pub use minter::CredentialMinter;
pub use remember_me::{
    MemoryTokenStore, PgTokenStore, TokenSeries, TokenSeriesStore, hash_token_secret,
};
pub use rotator::{RemintPolicy, Rotation, SeedRotator};
pub use store::{MemorySeedStore, PgSeedStore, SeedStore};
pub use types::{PrincipalId, Seed, SeedRecord};
pub use validator::{CredentialValidator, RedeemOutcome, Redemption, Validation};

pub(crate) use types::unix_now;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{Instrument, debug, info, instrument};

const DEFAULT_REMEMBER_ME_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;

/// DDL for the PostgreSQL backends; every statement is idempotent.
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Create the tables used by [`PgDirectory`], [`PgSeedStore`] and [`PgTokenStore`].
///
/// # Errors
/// Storage errors.
pub async fn apply_schema(pool: &PgPool) -> Result<(), SeedError> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "MIGRATE"
    );
    sqlx::raw_sql(SCHEMA).execute(pool).instrument(span).await?;
    Ok(())
}

/// Tunables for the gate.
#[derive(Clone, Debug)]
pub struct SeedConfig {
    remember_me_ttl_seconds: i64,
    remint_policy: RemintPolicy,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            remember_me_ttl_seconds: DEFAULT_REMEMBER_ME_TTL_SECONDS,
            remint_policy: RemintPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_remember_me_ttl_seconds(mut self, seconds: i64) -> Self {
        self.remember_me_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remint_policy(mut self, policy: RemintPolicy) -> Self {
        self.remint_policy = policy;
        self
    }

    #[must_use]
    pub fn remember_me_ttl_seconds(&self) -> i64 {
        self.remember_me_ttl_seconds
    }

    #[must_use]
    pub fn remint_policy(&self) -> RemintPolicy {
        self.remint_policy
    }
}

/// Entry point used by the surrounding authentication layer.
pub struct SeedGate {
    directory: Arc<dyn PrincipalDirectory>,
    seeds: Arc<dyn SeedStore>,
    tokens: Arc<dyn TokenSeriesStore>,
    minter: Arc<CredentialMinter>,
    validator: CredentialValidator,
    rotator: SeedRotator,
}

impl SeedGate {
    #[must_use]
    pub fn new(
        directory: Arc<dyn PrincipalDirectory>,
        seeds: Arc<dyn SeedStore>,
        tokens: Arc<dyn TokenSeriesStore>,
        config: &SeedConfig,
    ) -> Self {
        let ttl = config.remember_me_ttl_seconds();
        let minter = Arc::new(CredentialMinter::new(seeds.clone(), tokens.clone(), ttl));
        let validator =
            CredentialValidator::new(directory.clone(), seeds.clone(), tokens.clone(), ttl);
        let rotator = SeedRotator::new(
            seeds.clone(),
            tokens.clone(),
            minter.clone(),
            config.remint_policy(),
        );
        Self {
            directory,
            seeds,
            tokens,
            minter,
            validator,
            rotator,
        }
    }

    /// Gate over in-memory directory, seed and series stores.
    #[must_use]
    pub fn in_memory(config: &SeedConfig) -> Self {
        let directory: Arc<dyn PrincipalDirectory> = Arc::new(MemoryDirectory::new());
        let seeds = Arc::new(MemorySeedStore::new(
            directory.clone(),
            Arc::new(OsSeedGenerator),
        ));
        Self::new(directory, seeds, Arc::new(MemoryTokenStore::new()), config)
    }

    /// Gate over the PostgreSQL tables in `sql/schema.sql`.
    #[must_use]
    pub fn postgres(pool: &PgPool, config: &SeedConfig) -> Self {
        Self::new(
            Arc::new(PgDirectory::new(pool.clone())),
            Arc::new(PgSeedStore::new(pool.clone(), Arc::new(OsSeedGenerator))),
            Arc::new(PgTokenStore::new(pool.clone())),
            config,
        )
    }

    /// Create a principal in the directory; `false` if the id is taken.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn create_principal(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        self.directory.create_account(principal, password).await
    }

    /// Check a password against the directory.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn authenticate(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        self.directory.authenticate(principal, password).await
    }

    /// # Errors
    /// Storage errors.
    pub async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        self.directory.principal_exists(principal).await
    }

    #[must_use]
    pub fn remint_policy(&self) -> RemintPolicy {
        self.rotator.policy()
    }

    #[must_use]
    pub fn remember_me_ttl_seconds(&self) -> i64 {
        self.minter.remember_me_ttl_seconds()
    }

    /// Current seed of a principal (created on first access).
    ///
    /// # Errors
    /// See [`SeedStore::current_seed`].
    pub async fn current_seed(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        self.seeds.current_seed(principal).await
    }

    /// Issue a credential stamped with the current seed.
    ///
    /// # Errors
    /// See [`CredentialMinter::mint`].
    pub async fn mint_credential(
        &self,
        principal: &PrincipalId,
        kind: CredentialKind,
    ) -> Result<Credential, SeedError> {
        self.minter.mint(principal, kind).await
    }

    /// Accept or reject a presented credential.
    ///
    /// # Errors
    /// See [`CredentialValidator::validate`].
    pub async fn validate_credential(
        &self,
        credential: &Credential,
    ) -> Result<Validation, SeedError> {
        self.validator.validate(credential).await
    }

    /// Exchange a remember-me credential for a session and a renewed token.
    ///
    /// # Errors
    /// See [`CredentialValidator::redeem`].
    pub async fn redeem_remember_me(
        &self,
        credential: &Credential,
    ) -> Result<RedeemOutcome, SeedError> {
        self.validator.redeem(credential).await
    }

    /// Rebuild the remember-me credential a client holds as `series.secret`.
    ///
    /// The principal and embedded seed come from the stored series; the secret
    /// is not checked here, [`Self::validate_credential`] and
    /// [`Self::redeem_remember_me`] do that. `None` when the series is unknown.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn resolve_remember_me(
        &self,
        series_id: &str,
        token_secret: SecretString,
    ) -> Result<Option<Credential>, SeedError> {
        let Some(series) = self.tokens.find(series_id).await? else {
            return Ok(None);
        };
        let renewed_at = series
            .expires_at_unix
            .saturating_sub(self.remember_me_ttl_seconds());
        Ok(Some(Credential::remember_me(
            series.principal_id,
            series.embedded_seed,
            renewed_at,
            RememberMeToken::new(series.series_id, token_secret),
        )))
    }

    /// Revoke a series on logout, only when the presented secret is current.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn revoke_remember_me(
        &self,
        series_id: &str,
        token_secret: &SecretString,
    ) -> Result<bool, SeedError> {
        match self.tokens.find(series_id).await? {
            Some(series) if series.secret_matches(token_secret.expose_secret()) => {
                self.tokens.revoke(series_id).await?;
                Ok(true)
            }
            Some(_) => {
                debug!("Ignored logout for remember-me series with stale secret");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Drop remember-me series that expired without being redeemed.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn purge_expired_remember_me(&self) -> Result<u64, SeedError> {
        self.tokens.purge_expired(unix_now()).await
    }

    /// Rotate without an initiating credential (administrative revocation).
    ///
    /// # Errors
    /// See [`SeedRotator::rotate_for`].
    pub async fn rotate_seed(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        self.rotator
            .rotate_for(principal, None)
            .await
            .map(|rotation| rotation.record)
    }

    /// Rotate on behalf of a request that holds `initiator`.
    ///
    /// # Errors
    /// See [`SeedRotator::rotate_for`].
    pub async fn rotate_seed_for(
        &self,
        principal: &PrincipalId,
        initiator: &Credential,
    ) -> Result<Rotation, SeedError> {
        self.rotator.rotate_for(principal, Some(initiator)).await
    }

    /// Remove a principal together with its seed and remember-me series.
    ///
    /// This is the only removal path exposed by the gate: dropping the account
    /// without forgetting its seed would let a re-created account with the same
    /// id accept the old credentials. Returns `false` if the principal did not
    /// exist.
    ///
    /// # Errors
    /// Storage errors.
    #[instrument(skip(self), fields(principal = %principal))]
    pub async fn remove_principal(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        let removed = self.directory.remove_account(principal).await?;
        self.seeds.forget(principal).await?;
        self.tokens.revoke_all(principal).await?;
        if removed {
            info!("Removed principal");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_config_defaults_and_overrides() {
        let config = SeedConfig::new();
        assert_eq!(
            config.remember_me_ttl_seconds(),
            DEFAULT_REMEMBER_ME_TTL_SECONDS
        );
        assert_eq!(config.remint_policy(), RemintPolicy::KeepInitiator);

        let config = config
            .with_remember_me_ttl_seconds(42)
            .with_remint_policy(RemintPolicy::LogoutEverywhere);
        assert_eq!(config.remember_me_ttl_seconds(), 42);
        assert_eq!(config.remint_policy(), RemintPolicy::LogoutEverywhere);
    }

    #[tokio::test]
    async fn remove_principal_clears_seed_and_series() -> Result<(), SeedError> {
        let gate = SeedGate::in_memory(&SeedConfig::new());
        let alice = PrincipalId::from("alice");
        gate.create_principal(&alice, "alice").await?;
        let credential = gate
            .mint_credential(&alice, CredentialKind::RememberMe)
            .await?;

        assert!(gate.remove_principal(&alice).await?);
        assert!(!gate.remove_principal(&alice).await?);
        assert_eq!(
            gate.validate_credential(&credential).await?,
            Validation::Rejected(Rejection::PrincipalGone)
        );
        assert!(matches!(
            gate.current_seed(&alice).await,
            Err(SeedError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn recreated_principal_rejects_old_credentials() -> Result<(), SeedError> {
        let gate = SeedGate::in_memory(&SeedConfig::new());
        let alice = PrincipalId::from("alice");
        gate.create_principal(&alice, "alice").await?;
        let session = gate.mint_credential(&alice, CredentialKind::Session).await?;

        assert!(gate.remove_principal(&alice).await?);
        assert!(gate.create_principal(&alice, "new-owner").await?);
        assert_eq!(
            gate.validate_credential(&session).await?,
            Validation::Rejected(Rejection::SeedMismatch)
        );
        let fresh = gate.mint_credential(&alice, CredentialKind::Session).await?;
        assert!(gate.validate_credential(&fresh).await?.is_accepted());
        Ok(())
    }

    #[tokio::test]
    async fn resolve_and_revoke_remember_me() -> Result<(), SeedError> {
        let gate = SeedGate::in_memory(&SeedConfig::new());
        let alice = PrincipalId::from("alice");
        gate.create_principal(&alice, "alice").await?;
        let minted = gate
            .mint_credential(&alice, CredentialKind::RememberMe)
            .await?;
        let Some(token) = minted.remember_me_token() else {
            panic!("remember-me credential without token");
        };

        let resolved = gate
            .resolve_remember_me(token.series_id(), token.token_secret().to_string().into())
            .await?;
        let Some(resolved) = resolved else {
            panic!("series should resolve");
        };
        assert_eq!(resolved.principal_id(), &alice);
        assert_eq!(resolved.embedded_seed(), minted.embedded_seed());
        assert!(gate.validate_credential(&resolved).await?.is_accepted());

        let wrong: SecretString = "wrong".to_string().into();
        assert!(!gate.revoke_remember_me(token.series_id(), &wrong).await?);
        let right: SecretString = token.token_secret().to_string().into();
        assert!(gate.revoke_remember_me(token.series_id(), &right).await?);
        assert!(gate
            .resolve_remember_me(token.series_id(), right)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rotate_seed_is_administrative() -> Result<(), SeedError> {
        let gate = SeedGate::in_memory(&SeedConfig::new());
        let alice = PrincipalId::from("alice");
        gate.create_principal(&alice, "alice").await?;
        let before = gate.current_seed(&alice).await?;

        let rotated = gate.rotate_seed(&alice).await?;
        assert_ne!(before.seed, rotated.seed);
        assert_eq!(gate.current_seed(&alice).await?.seed, rotated.seed);
        Ok(())
    }
}
