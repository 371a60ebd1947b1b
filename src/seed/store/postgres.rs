use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use tracing::Instrument;

use super::{SeedStore, fresh_seed};
use crate::seed::{PrincipalId, Seed, SeedError, SeedGenerator, SeedRecord};

/// Seed store backed by the `principal_seeds` table.
///
/// Existence is decided by the `principals` table itself, so lazy creation and
/// the `NotFound` check happen in one statement.
pub struct PgSeedStore {
    pool: PgPool,
    generator: Arc<dyn SeedGenerator>,
}

impl PgSeedStore {
    #[must_use]
    pub fn new(pool: PgPool, generator: Arc<dyn SeedGenerator>) -> Self {
        Self { pool, generator }
    }

    async fn read(&self, principal: &PrincipalId) -> Result<Option<SeedRecord>, SeedError> {
        let query = r"
            SELECT principal_id, seed, EXTRACT(EPOCH FROM rotated_at)::BIGINT AS rotated_at_unix
            FROM principal_seeds
            WHERE principal_id = $1
        ";
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
        Ok(row.map(|row| record_from_row(&row)))
    }
}

fn record_from_row(row: &PgRow) -> SeedRecord {
    SeedRecord {
        principal_id: PrincipalId::new(row.get::<String, _>("principal_id")),
        seed: Seed::from_encoded(row.get("seed")),
        last_rotated_at_unix: row.get("rotated_at_unix"),
    }
}

#[async_trait]
impl SeedStore for PgSeedStore {
    async fn current_seed(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        if let Some(record) = self.read(principal).await? {
            return Ok(record);
        }

        // First committed insert wins; concurrent losers fall through to the read.
        let candidate = self.generator.generate()?;
        let query = r"
            INSERT INTO principal_seeds (principal_id, seed)
            SELECT id, $2 FROM principals WHERE id = $1
            ON CONFLICT (principal_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal.as_str())
            .bind(candidate.expose())
            .execute(&self.pool)
            .instrument(span)
            .await?;

        self.read(principal)
            .await?
            .ok_or_else(|| SeedError::NotFound(principal.clone()))
    }

    async fn rotate(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        let previous = self.read(principal).await?;
        let seed = fresh_seed(
            self.generator.as_ref(),
            previous.as_ref().map(|record| &record.seed),
        )?;

        let query = r"
            INSERT INTO principal_seeds (principal_id, seed, rotated_at)
            SELECT id, $2, NOW() FROM principals WHERE id = $1
            ON CONFLICT (principal_id)
                DO UPDATE SET seed = EXCLUDED.seed, rotated_at = EXCLUDED.rotated_at
            RETURNING principal_id, seed, EXTRACT(EPOCH FROM rotated_at)::BIGINT AS rotated_at_unix
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal.as_str())
            .bind(seed.expose())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| record_from_row(&row))
            .ok_or_else(|| SeedError::NotFound(principal.clone()))
    }

    async fn forget(&self, principal: &PrincipalId) -> Result<(), SeedError> {
        let query = "DELETE FROM principal_seeds WHERE principal_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
