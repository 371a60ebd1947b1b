use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    Credential, CredentialKind, PrincipalId, RememberMeToken, SeedError, SeedRecord, SeedStore,
    TokenSeries, TokenSeriesStore, generator::random_token, remember_me::hash_token_secret,
    types::unix_now,
};

/// Issues credentials stamped with the principal's current seed.
pub struct CredentialMinter {
    seeds: Arc<dyn SeedStore>,
    tokens: Arc<dyn TokenSeriesStore>,
    remember_me_ttl_seconds: i64,
}

impl CredentialMinter {
    #[must_use]
    pub fn new(
        seeds: Arc<dyn SeedStore>,
        tokens: Arc<dyn TokenSeriesStore>,
        remember_me_ttl_seconds: i64,
    ) -> Self {
        Self {
            seeds,
            tokens,
            remember_me_ttl_seconds,
        }
    }

    /// Mint a credential of `kind` for `principal`.
    ///
    /// The current seed is read exactly once. Remember-me credentials also get
    /// a fresh series id and token secret, recorded in the series store.
    ///
    /// # Errors
    /// Propagates [`SeedError::NotFound`] and generator/storage errors.
    #[instrument(skip_all, fields(principal = %principal, ?kind))]
    pub async fn mint(
        &self,
        principal: &PrincipalId,
        kind: CredentialKind,
    ) -> Result<Credential, SeedError> {
        let record = self.seeds.current_seed(principal).await?;
        self.issue(record, kind).await
    }

    /// Issue a credential of `kind` stamped with `record`'s seed, without
    /// reading the store again.
    ///
    /// # Errors
    /// Generator and series storage errors.
    pub async fn issue(
        &self,
        record: SeedRecord,
        kind: CredentialKind,
    ) -> Result<Credential, SeedError> {
        let issued_at = unix_now();

        match kind {
            CredentialKind::Session => Ok(Credential::session(
                record.principal_id,
                record.seed,
                issued_at,
            )),
            CredentialKind::RememberMe => {
                let series_id = random_token()?;
                let token_secret = random_token()?;
                self.tokens
                    .create(TokenSeries {
                        series_id: series_id.clone(),
                        principal_id: record.principal_id.clone(),
                        token_hash: hash_token_secret(&token_secret),
                        embedded_seed: record.seed.clone(),
                        expires_at_unix: issued_at.saturating_add(self.remember_me_ttl_seconds),
                    })
                    .await?;
                debug!("Issued remember-me series");
                Ok(Credential::remember_me(
                    record.principal_id,
                    record.seed,
                    issued_at,
                    RememberMeToken::new(series_id, SecretString::from(token_secret)),
                ))
            }
        }
    }

    #[must_use]
    pub fn remember_me_ttl_seconds(&self) -> i64 {
        self.remember_me_ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{
        MemoryDirectory, MemorySeedStore, MemoryTokenStore, OsSeedGenerator, PrincipalDirectory,
    };

    type Fixture = (
        CredentialMinter,
        Arc<MemorySeedStore>,
        Arc<MemoryTokenStore>,
    );

    async fn fixture() -> Result<Fixture, SeedError> {
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .create_account(&PrincipalId::from("alice"), "alice")
            .await?;
        let seeds = Arc::new(MemorySeedStore::new(directory, Arc::new(OsSeedGenerator)));
        let tokens = Arc::new(MemoryTokenStore::new());
        let minter = CredentialMinter::new(seeds.clone(), tokens.clone(), 60);
        Ok((minter, seeds, tokens))
    }

    #[tokio::test]
    async fn session_embeds_current_seed() -> Result<(), SeedError> {
        let (minter, seeds, tokens) = fixture().await?;
        let alice = PrincipalId::from("alice");

        let credential = minter.mint(&alice, CredentialKind::Session).await?;
        let current = seeds.current_seed(&alice).await?;

        assert_eq!(credential.kind(), CredentialKind::Session);
        assert_eq!(credential.principal_id(), &alice);
        assert_eq!(credential.embedded_seed(), &current.seed);
        assert!(tokens.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn remember_me_records_hashed_series() -> Result<(), SeedError> {
        let (minter, seeds, tokens) = fixture().await?;
        let alice = PrincipalId::from("alice");

        let credential = minter.mint(&alice, CredentialKind::RememberMe).await?;
        let Some(token) = credential.remember_me_token() else {
            panic!("remember-me credential without token");
        };
        let stored = tokens.find(token.series_id()).await?;
        let Some(stored) = stored else {
            panic!("series not recorded");
        };

        assert!(stored.secret_matches(token.token_secret()));
        assert_ne!(stored.token_hash, token.token_secret().as_bytes());
        assert_eq!(stored.embedded_seed, seeds.current_seed(&alice).await?.seed);
        assert_eq!(
            stored.expires_at_unix,
            credential.issued_at_unix() + minter.remember_me_ttl_seconds()
        );
        assert_ne!(token.series_id(), token.token_secret());
        Ok(())
    }

    #[tokio::test]
    async fn minting_does_not_change_seed() -> Result<(), SeedError> {
        let (minter, seeds, _tokens) = fixture().await?;
        let alice = PrincipalId::from("alice");

        let first = minter.mint(&alice, CredentialKind::RememberMe).await?;
        let second = minter.mint(&alice, CredentialKind::Session).await?;
        assert_eq!(first.embedded_seed(), second.embedded_seed());
        assert_eq!(
            first.embedded_seed(),
            &seeds.current_seed(&alice).await?.seed
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_principal_propagates_not_found() -> Result<(), SeedError> {
        let (minter, _seeds, _tokens) = fixture().await?;
        let result = minter
            .mint(&PrincipalId::from("mallory"), CredentialKind::Session)
            .await;
        assert!(matches!(result, Err(SeedError::NotFound(_))));
        Ok(())
    }
}
