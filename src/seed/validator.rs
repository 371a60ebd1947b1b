//! The per-request gate.
//!
//! `validate` runs on every authenticated request: one directory lookup, one
//! seed read, one constant-time compare. It performs no writes on success.
//! Only a detected remember-me replay has a side effect (the series is revoked).

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{
    Credential, PrincipalDirectory, PrincipalId, Rejection, RememberMeToken, SeedError, SeedStore,
    TokenSeries, TokenSeriesStore, generator::random_token, remember_me::hash_token_secret,
    types::unix_now,
};

/// Outcome of validating a credential.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validation {
    /// The request may proceed as this principal.
    Accepted(PrincipalId),
    /// The client must re-authenticate.
    Rejected(Rejection),
}

impl Validation {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Credentials issued by a successful remember-me redemption.
#[derive(Clone, Debug)]
pub struct Redemption {
    /// New session credential for the request.
    pub session: Credential,
    /// Same series with a fresh token secret; the old secret is now stale.
    pub remember_me: Credential,
}

/// Outcome of redeeming a remember-me credential.
#[derive(Clone, Debug)]
pub enum RedeemOutcome {
    Redeemed(Redemption),
    Rejected(Rejection),
}

pub struct CredentialValidator {
    directory: Arc<dyn PrincipalDirectory>,
    seeds: Arc<dyn SeedStore>,
    tokens: Arc<dyn TokenSeriesStore>,
    remember_me_ttl_seconds: i64,
}

impl CredentialValidator {
    #[must_use]
    pub fn new(
        directory: Arc<dyn PrincipalDirectory>,
        seeds: Arc<dyn SeedStore>,
        tokens: Arc<dyn TokenSeriesStore>,
        remember_me_ttl_seconds: i64,
    ) -> Self {
        Self {
            directory,
            seeds,
            tokens,
            remember_me_ttl_seconds,
        }
    }

    /// Check a presented credential against the principal's current seed.
    ///
    /// # Errors
    /// Storage errors only; every authentication failure is a [`Validation::Rejected`].
    #[instrument(skip_all, fields(principal = %credential.principal_id()))]
    pub async fn validate(&self, credential: &Credential) -> Result<Validation, SeedError> {
        self.check(credential).await.map(|outcome| match outcome {
            Ok(_) => Validation::Accepted(credential.principal_id().clone()),
            Err(rejection) => Validation::Rejected(rejection),
        })
    }

    /// Exchange a remember-me credential for a fresh session.
    ///
    /// The credential is validated first, then its series is advanced to a new
    /// token secret. Losing the compare-and-swap to a concurrent redemption is
    /// treated as replay.
    ///
    /// # Errors
    /// Storage and entropy errors.
    #[instrument(skip_all, fields(principal = %credential.principal_id()))]
    pub async fn redeem(&self, credential: &Credential) -> Result<RedeemOutcome, SeedError> {
        let series = match self.check(credential).await? {
            Ok(Some(series)) => series,
            // A plain session has nothing to redeem.
            Ok(None) => return Ok(RedeemOutcome::Rejected(Rejection::UnknownSeries)),
            Err(rejection) => return Ok(RedeemOutcome::Rejected(rejection)),
        };

        let next_secret = random_token()?;
        let now = unix_now();
        let advanced = self
            .tokens
            .advance(
                &series.series_id,
                &series.token_hash,
                hash_token_secret(&next_secret),
                now.saturating_add(self.remember_me_ttl_seconds),
            )
            .await?;
        if !advanced {
            return self.replay(&series).await.map(RedeemOutcome::Rejected);
        }

        let principal = credential.principal_id().clone();
        let seed = credential.embedded_seed().clone();
        Ok(RedeemOutcome::Redeemed(Redemption {
            session: Credential::session(principal.clone(), seed.clone(), now),
            remember_me: Credential::remember_me(
                principal,
                seed,
                now,
                RememberMeToken::new(series.series_id, SecretString::from(next_secret)),
            ),
        }))
    }

    /// Shared checks; yields the series record for remember-me credentials.
    async fn check(
        &self,
        credential: &Credential,
    ) -> Result<Result<Option<TokenSeries>, Rejection>, SeedError> {
        let principal = credential.principal_id();

        if !self.directory.principal_exists(principal).await? {
            debug!("Rejected credential for removed principal");
            return Ok(Err(Rejection::PrincipalGone));
        }

        let current = match self.seeds.current_seed(principal).await {
            Ok(record) => record,
            // Removed between the directory check and the read.
            Err(SeedError::NotFound(_)) => return Ok(Err(Rejection::PrincipalGone)),
            Err(err) => return Err(err),
        };

        if !current.seed.matches(credential.embedded_seed()) {
            debug!("Rejected credential minted under a rotated seed");
            return Ok(Err(Rejection::SeedMismatch));
        }

        let Some(token) = credential.remember_me_token() else {
            return Ok(Ok(None));
        };

        let Some(series) = self.tokens.find(token.series_id()).await? else {
            debug!("Rejected remember-me token with unknown series");
            return Ok(Err(Rejection::UnknownSeries));
        };
        if &series.principal_id != principal {
            warn!(
                series_principal = %series.principal_id,
                "Remember-me series presented for another principal"
            );
            return Ok(Err(Rejection::UnknownSeries));
        }
        if series.is_expired(unix_now()) {
            debug!("Rejected expired remember-me token");
            self.tokens.revoke(&series.series_id).await?;
            return Ok(Err(Rejection::Expired));
        }
        if !series.secret_matches(token.token_secret()) {
            return self.replay(&series).await.map(Err);
        }

        Ok(Ok(Some(series)))
    }

    async fn replay(&self, series: &TokenSeries) -> Result<Rejection, SeedError> {
        warn!(
            principal = %series.principal_id,
            series = %series.series_id,
            "Remember-me token replay detected; revoking series"
        );
        self.tokens.revoke(&series.series_id).await?;
        Ok(Rejection::ReplayDetected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{
        CredentialKind, CredentialMinter, MemoryDirectory, MemorySeedStore, MemoryTokenStore,
        OsSeedGenerator,
    };

    struct Fixture {
        directory: Arc<MemoryDirectory>,
        seeds: Arc<MemorySeedStore>,
        tokens: Arc<MemoryTokenStore>,
        minter: CredentialMinter,
        validator: CredentialValidator,
    }

    async fn fixture(ttl: i64) -> Result<Fixture, SeedError> {
        let directory = Arc::new(MemoryDirectory::new());
        for name in ["alice", "bob"] {
            directory.create_account(&PrincipalId::from(name), name).await?;
        }
        let seeds = Arc::new(MemorySeedStore::new(
            directory.clone(),
            Arc::new(OsSeedGenerator),
        ));
        let tokens = Arc::new(MemoryTokenStore::new());
        let minter = CredentialMinter::new(seeds.clone(), tokens.clone(), ttl);
        let validator =
            CredentialValidator::new(directory.clone(), seeds.clone(), tokens.clone(), ttl);
        Ok(Fixture {
            directory,
            seeds,
            tokens,
            minter,
            validator,
        })
    }

    #[tokio::test]
    async fn fresh_credentials_are_accepted() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let alice = PrincipalId::from("alice");
        for kind in [CredentialKind::Session, CredentialKind::RememberMe] {
            let credential = f.minter.mint(&alice, kind).await?;
            assert_eq!(
                f.validator.validate(&credential).await?,
                Validation::Accepted(alice.clone())
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn rotation_rejects_with_seed_mismatch() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let alice = PrincipalId::from("alice");
        let credential = f.minter.mint(&alice, CredentialKind::Session).await?;

        f.seeds.rotate(&alice).await?;
        assert_eq!(
            f.validator.validate(&credential).await?,
            Validation::Rejected(Rejection::SeedMismatch)
        );
        Ok(())
    }

    #[tokio::test]
    async fn removed_principal_is_gone() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let bob = PrincipalId::from("bob");
        let credential = f.minter.mint(&bob, CredentialKind::Session).await?;

        f.directory.remove_account(&bob).await?;
        assert_eq!(
            f.validator.validate(&credential).await?,
            Validation::Rejected(Rejection::PrincipalGone)
        );
        Ok(())
    }

    #[tokio::test]
    async fn validate_does_not_consume_remember_me_secret() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let credential = f
            .minter
            .mint(&PrincipalId::from("alice"), CredentialKind::RememberMe)
            .await?;
        for _ in 0..3 {
            assert!(f.validator.validate(&credential).await?.is_accepted());
        }
        Ok(())
    }

    #[tokio::test]
    async fn redeem_rotates_secret_and_flags_reuse() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let alice = PrincipalId::from("alice");
        let original = f.minter.mint(&alice, CredentialKind::RememberMe).await?;

        let RedeemOutcome::Redeemed(redemption) = f.validator.redeem(&original).await? else {
            panic!("first redemption should succeed");
        };
        assert_eq!(redemption.session.kind(), CredentialKind::Session);
        assert_eq!(redemption.session.principal_id(), &alice);
        assert!(f.validator.validate(&redemption.remember_me).await?.is_accepted());
        assert_eq!(
            redemption
                .remember_me
                .remember_me_token()
                .map(RememberMeToken::series_id),
            original.remember_me_token().map(RememberMeToken::series_id)
        );

        // The stolen copy still carries the old secret.
        let reuse = f.validator.redeem(&original).await?;
        assert!(matches!(
            reuse,
            RedeemOutcome::Rejected(Rejection::ReplayDetected)
        ));
        // The whole series is revoked, so the legitimate holder is out too.
        assert!(f.tokens.is_empty());
        assert_eq!(
            f.validator.validate(&redemption.remember_me).await?,
            Validation::Rejected(Rejection::UnknownSeries)
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_series_is_rejected_and_removed() -> Result<(), SeedError> {
        let f = fixture(0).await?;
        let credential = f
            .minter
            .mint(&PrincipalId::from("alice"), CredentialKind::RememberMe)
            .await?;
        assert_eq!(
            f.validator.validate(&credential).await?,
            Validation::Rejected(Rejection::Expired)
        );
        assert!(f.tokens.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn series_cannot_be_borrowed_by_another_principal() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let alice_token = f
            .minter
            .mint(&PrincipalId::from("alice"), CredentialKind::RememberMe)
            .await?;
        let bob = PrincipalId::from("bob");
        let bob_seed = f.seeds.current_seed(&bob).await?.seed;
        let Some(token) = alice_token.remember_me_token().cloned() else {
            panic!("missing token");
        };
        let forged = Credential::remember_me(bob, bob_seed, 0, token);
        assert_eq!(
            f.validator.validate(&forged).await?,
            Validation::Rejected(Rejection::UnknownSeries)
        );
        Ok(())
    }

    #[tokio::test]
    async fn session_credential_cannot_be_redeemed() -> Result<(), SeedError> {
        let f = fixture(60).await?;
        let session = f
            .minter
            .mint(&PrincipalId::from("alice"), CredentialKind::Session)
            .await?;
        assert!(matches!(
            f.validator.redeem(&session).await?,
            RedeemOutcome::Rejected(Rejection::UnknownSeries)
        ));
        Ok(())
    }
}
