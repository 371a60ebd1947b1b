//! Remember-me token series.
//!
//! Each persistent token belongs to a series. The series id is stable, the
//! token secret is replaced every time the token is redeemed, and only a hash
//! of the current secret is stored. Presenting a known series with a stale
//! secret means the token was copied and used elsewhere.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use tracing::Instrument;

use super::{PrincipalId, Seed, SeedError};

/// Stored state of one remember-me series.
#[derive(Clone, Debug)]
pub struct TokenSeries {
    pub series_id: String,
    pub principal_id: PrincipalId,
    pub token_hash: Vec<u8>,
    pub embedded_seed: Seed,
    pub expires_at_unix: i64,
}

impl TokenSeries {
    /// Constant-time check of a presented secret against the stored hash.
    #[must_use]
    pub fn secret_matches(&self, token_secret: &str) -> bool {
        self.token_hash
            .ct_eq(&hash_token_secret(token_secret))
            .into()
    }

    #[must_use]
    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at_unix
    }
}

/// Hash a token secret so raw values never reach storage.
#[must_use]
pub fn hash_token_secret(token_secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token_secret.as_bytes());
    hasher.finalize().to_vec()
}

#[async_trait]
pub trait TokenSeriesStore: Send + Sync {
    async fn create(&self, series: TokenSeries) -> Result<(), SeedError>;

    async fn find(&self, series_id: &str) -> Result<Option<TokenSeries>, SeedError>;

    /// Swap the token hash from `expected` to `next`, extending the expiry.
    ///
    /// Returns `false` when the stored hash is no longer `expected` (another
    /// redemption won) or the series is gone.
    async fn advance(
        &self,
        series_id: &str,
        expected: &[u8],
        next: Vec<u8>,
        expires_at_unix: i64,
    ) -> Result<bool, SeedError>;

    async fn revoke(&self, series_id: &str) -> Result<(), SeedError>;

    /// Revoke every series of a principal; returns how many were removed.
    async fn revoke_all(&self, principal: &PrincipalId) -> Result<u64, SeedError>;

    /// Drop series expired at `now_unix`; returns how many were removed.
    async fn purge_expired(&self, now_unix: i64) -> Result<u64, SeedError>;
}

/// In-memory series store.
///
/// `by_principal` indexes series ids per principal so [`TokenSeriesStore::revoke_all`]
/// only touches that principal's entries. Lock order is index first, then series.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    series: DashMap<String, TokenSeries>,
    by_principal: DashMap<PrincipalId, HashSet<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn unindex(&self, principal: &PrincipalId, series_id: &str) {
        if let Some(mut ids) = self.by_principal.get_mut(principal) {
            ids.remove(series_id);
        }
        self.by_principal.remove_if(principal, |_, ids| ids.is_empty());
    }
}

#[async_trait]
impl TokenSeriesStore for MemoryTokenStore {
    async fn create(&self, series: TokenSeries) -> Result<(), SeedError> {
        let mut ids = self
            .by_principal
            .entry(series.principal_id.clone())
            .or_default();
        ids.insert(series.series_id.clone());
        self.series.insert(series.series_id.clone(), series);
        Ok(())
    }

    async fn find(&self, series_id: &str) -> Result<Option<TokenSeries>, SeedError> {
        Ok(self.series.get(series_id).map(|entry| entry.value().clone()))
    }

    async fn advance(
        &self,
        series_id: &str,
        expected: &[u8],
        next: Vec<u8>,
        expires_at_unix: i64,
    ) -> Result<bool, SeedError> {
        let Some(mut entry) = self.series.get_mut(series_id) else {
            return Ok(false);
        };
        if !bool::from(entry.token_hash.ct_eq(expected)) {
            return Ok(false);
        }
        entry.token_hash = next;
        entry.expires_at_unix = expires_at_unix;
        Ok(true)
    }

    async fn revoke(&self, series_id: &str) -> Result<(), SeedError> {
        if let Some((_, series)) = self.series.remove(series_id) {
            self.unindex(&series.principal_id, series_id);
        }
        Ok(())
    }

    async fn revoke_all(&self, principal: &PrincipalId) -> Result<u64, SeedError> {
        let Some((_, ids)) = self.by_principal.remove(principal) else {
            return Ok(0);
        };
        let removed = ids
            .iter()
            .filter(|series_id| self.series.remove(series_id.as_str()).is_some())
            .count();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn purge_expired(&self, now_unix: i64) -> Result<u64, SeedError> {
        let expired: Vec<String> = self
            .series
            .iter()
            .filter(|entry| entry.is_expired(now_unix))
            .map(|entry| entry.key().clone())
            .collect();
        let mut removed = 0_u64;
        for series_id in expired {
            // Redeemed since the scan means it is no longer expired.
            if let Some((_, series)) = self
                .series
                .remove_if(&series_id, |_, series| series.is_expired(now_unix))
            {
                self.unindex(&series.principal_id, &series_id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Series store backed by the `remember_me_tokens` table.
#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn series_from_row(row: &PgRow) -> TokenSeries {
    TokenSeries {
        series_id: row.get("series_id"),
        principal_id: PrincipalId::new(row.get::<String, _>("principal_id")),
        token_hash: row.get("token_hash"),
        embedded_seed: Seed::from_encoded(row.get("embedded_seed")),
        expires_at_unix: row.get("expires_at_unix"),
    }
}

#[async_trait]
impl TokenSeriesStore for PgTokenStore {
    async fn create(&self, series: TokenSeries) -> Result<(), SeedError> {
        let query = r"
            INSERT INTO remember_me_tokens
                (series_id, principal_id, token_hash, embedded_seed, expires_at)
            VALUES ($1, $2, $3, $4, TO_TIMESTAMP($5))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&series.series_id)
            .bind(series.principal_id.as_str())
            .bind(&series.token_hash)
            .bind(series.embedded_seed.expose())
            .bind(series.expires_at_unix)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn find(&self, series_id: &str) -> Result<Option<TokenSeries>, SeedError> {
        let query = r"
            SELECT series_id, principal_id, token_hash, embedded_seed,
                   EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_at_unix
            FROM remember_me_tokens
            WHERE series_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(series_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.map(|row| series_from_row(&row)))
    }

    async fn advance(
        &self,
        series_id: &str,
        expected: &[u8],
        next: Vec<u8>,
        expires_at_unix: i64,
    ) -> Result<bool, SeedError> {
        let query = r"
            UPDATE remember_me_tokens
            SET token_hash = $3, expires_at = TO_TIMESTAMP($4), last_used_at = NOW()
            WHERE series_id = $1 AND token_hash = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(series_id)
            .bind(expected)
            .bind(next)
            .bind(expires_at_unix)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, series_id: &str) -> Result<(), SeedError> {
        let query = "DELETE FROM remember_me_tokens WHERE series_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(series_id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn revoke_all(&self, principal: &PrincipalId) -> Result<u64, SeedError> {
        let query = "DELETE FROM remember_me_tokens WHERE principal_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(principal.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now_unix: i64) -> Result<u64, SeedError> {
        let query = "DELETE FROM remember_me_tokens WHERE expires_at <= TO_TIMESTAMP($1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now_unix)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(id: &str, principal: &str, secret: &str) -> TokenSeries {
        TokenSeries {
            series_id: id.to_string(),
            principal_id: PrincipalId::from(principal),
            token_hash: hash_token_secret(secret),
            embedded_seed: Seed::from_encoded("seed".to_string()),
            expires_at_unix: 100,
        }
    }

    #[test]
    fn secret_matches_only_current_secret() {
        let series = series("s1", "alice", "secret");
        assert!(series.secret_matches("secret"));
        assert!(!series.secret_matches("secret2"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let series = series("s1", "alice", "secret");
        assert!(!series.is_expired(99));
        assert!(series.is_expired(100));
    }

    #[tokio::test]
    async fn advance_is_compare_and_swap() -> Result<(), SeedError> {
        let store = MemoryTokenStore::new();
        store.create(series("s1", "alice", "one")).await?;

        let old = hash_token_secret("one");
        assert!(
            store
                .advance("s1", &old, hash_token_secret("two"), 200)
                .await?
        );
        // Second attempt with the stale hash loses.
        assert!(
            !store
                .advance("s1", &old, hash_token_secret("three"), 300)
                .await?
        );
        assert!(!store.advance("missing", &old, Vec::new(), 0).await?);

        let current = store.find("s1").await?;
        assert!(current.as_ref().is_some_and(|s| s.secret_matches("two")));
        assert_eq!(current.map(|s| s.expires_at_unix), Some(200));
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_principal() -> Result<(), SeedError> {
        let store = MemoryTokenStore::new();
        store.create(series("a1", "alice", "x")).await?;
        store.create(series("a2", "alice", "y")).await?;
        store.create(series("b1", "bob", "z")).await?;

        assert_eq!(store.revoke_all(&PrincipalId::from("alice")).await?, 2);
        assert_eq!(store.revoke_all(&PrincipalId::from("alice")).await?, 0);
        assert_eq!(store.len(), 1);
        assert!(store.find("b1").await?.is_some());
        assert!(!store.by_principal.contains_key(&PrincipalId::from("alice")));

        store.revoke("b1").await?;
        assert!(store.is_empty());
        assert!(store.by_principal.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_skips_series_already_revoked() -> Result<(), SeedError> {
        let store = MemoryTokenStore::new();
        store.create(series("a1", "alice", "x")).await?;
        store.create(series("a2", "alice", "y")).await?;
        store.revoke("a1").await?;

        assert_eq!(store.revoke_all(&PrincipalId::from("alice")).await?, 1);
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn purge_expired_reclaims_unredeemed_series() -> Result<(), SeedError> {
        let store = MemoryTokenStore::new();
        store.create(series("a1", "alice", "x")).await?;
        let mut fresh = series("b1", "bob", "y");
        fresh.expires_at_unix = 500;
        store.create(fresh).await?;

        assert_eq!(store.purge_expired(99).await?, 0);
        assert_eq!(store.purge_expired(100).await?, 1);
        assert_eq!(store.len(), 1);
        assert!(store.find("a1").await?.is_none());
        assert!(!store.by_principal.contains_key(&PrincipalId::from("alice")));
        assert!(store.find("b1").await?.is_some());
        Ok(())
    }
}
