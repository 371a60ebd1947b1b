//! Principal directory consumed by the seed gate.
//!
//! The gate only needs `principal_exists`. Account creation, removal and the
//! password check exist so the bundled server can be driven end to end; they
//! are a development realm, not a credential verifier.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use subtle::ConstantTimeEq;
use tracing::Instrument;

use super::{PrincipalId, SeedError};

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Whether the principal currently exists.
    async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool, SeedError>;

    /// Create the account; returns `false` if it already existed.
    async fn create_account(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError>;

    /// Remove the account; returns `false` if it did not exist.
    ///
    /// Leaves the seed and remember-me series in place; callers go through
    /// [`SeedGate::remove_principal`](super::SeedGate::remove_principal).
    async fn remove_account(&self, principal: &PrincipalId) -> Result<bool, SeedError>;

    /// Check a password for the principal.
    async fn authenticate(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError>;
}

fn hash_password(password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn password_matches(stored: &[u8], password: &str) -> bool {
    stored.ct_eq(&hash_password(password)).into()
}

/// In-memory realm keyed by principal id.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: DashMap<PrincipalId, Vec<u8>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        Ok(self.accounts.contains_key(principal))
    }

    async fn create_account(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        let mut created = false;
        self.accounts.entry(principal.clone()).or_insert_with(|| {
            created = true;
            hash_password(password)
        });
        Ok(created)
    }

    async fn remove_account(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        Ok(self.accounts.remove(principal).is_some())
    }

    async fn authenticate(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        let stored = self.accounts.get(principal).map(|entry| entry.value().clone());
        Ok(stored.is_some_and(|stored| password_matches(&stored, password)))
    }
}

/// Directory backed by the `principals` table.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgDirectory {
    async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        let query = "SELECT EXISTS (SELECT 1 FROM principals WHERE id = $1) AS present";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get("present"))
    }

    async fn create_account(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        let query = r"
            INSERT INTO principals (id, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(principal.as_str())
            .bind(hash_password(password))
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_account(&self, principal: &PrincipalId) -> Result<bool, SeedError> {
        // principal_seeds and remember_me_tokens rows go with it (ON DELETE CASCADE).
        let query = "DELETE FROM principals WHERE id = $1";
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
        Ok(result.rows_affected() == 1)
    }

    async fn authenticate(
        &self,
        principal: &PrincipalId,
        password: &str,
    ) -> Result<bool, SeedError> {
        let query = "SELECT password_hash FROM principals WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.is_some_and(|row| {
            let stored: Vec<u8> = row.get("password_hash");
            password_matches(&stored, password)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_directory_tracks_accounts() -> Result<(), SeedError> {
        let directory = MemoryDirectory::new();
        let alice = PrincipalId::from("alice");

        assert!(!directory.principal_exists(&alice).await?);
        assert!(directory.create_account(&alice, "alice").await?);
        assert!(!directory.create_account(&alice, "other").await?);
        assert!(directory.principal_exists(&alice).await?);
        assert_eq!(directory.len(), 1);

        assert!(directory.remove_account(&alice).await?);
        assert!(!directory.remove_account(&alice).await?);
        assert!(directory.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn memory_directory_authenticates_password() -> Result<(), SeedError> {
        let directory = MemoryDirectory::new();
        let bob = PrincipalId::from("bob");
        directory.create_account(&bob, "hunter2").await?;

        assert!(directory.authenticate(&bob, "hunter2").await?);
        assert!(!directory.authenticate(&bob, "hunter3").await?);
        assert!(
            !directory
                .authenticate(&PrincipalId::from("carol"), "hunter2")
                .await?
        );
        Ok(())
    }

    #[test]
    fn hash_password_stable() {
        assert_eq!(hash_password("a"), hash_password("a"));
        assert_ne!(hash_password("a"), hash_password("b"));
        assert!(password_matches(&hash_password("a"), "a"));
    }
}
