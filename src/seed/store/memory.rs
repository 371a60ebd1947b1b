use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use tracing::debug;

use super::{SeedStore, fresh_seed};
use crate::seed::{
    PrincipalDirectory, PrincipalId, SeedError, SeedGenerator, SeedRecord, types::unix_now,
};

/// Seed store held in a sharded concurrent map.
///
/// Reads take a shard read lock and clone the record out; lazy creation and
/// rotation take the shard write lock of that principal's key only.
pub struct MemorySeedStore {
    directory: Arc<dyn PrincipalDirectory>,
    generator: Arc<dyn SeedGenerator>,
    records: DashMap<PrincipalId, SeedRecord>,
}

impl MemorySeedStore {
    #[must_use]
    pub fn new(directory: Arc<dyn PrincipalDirectory>, generator: Arc<dyn SeedGenerator>) -> Self {
        Self {
            directory,
            generator,
            records: DashMap::new(),
        }
    }

    /// Number of principals with a materialized seed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn cached(&self, principal: &PrincipalId) -> Option<SeedRecord> {
        self.records
            .get(principal)
            .map(|record| record.value().clone())
    }

    async fn ensure_exists(&self, principal: &PrincipalId) -> Result<(), SeedError> {
        if self.directory.principal_exists(principal).await? {
            Ok(())
        } else {
            Err(SeedError::NotFound(principal.clone()))
        }
    }

    /// Confirm the principal outlived a write.
    ///
    /// A removal can land between `ensure_exists` and the insert, after the
    /// seed was already forgotten. The record written here is then an orphan a
    /// re-created account with the same id would inherit, so it is dropped
    /// (only if it is still the one this call wrote).
    async fn settle(&self, record: SeedRecord) -> Result<SeedRecord, SeedError> {
        if self.directory.principal_exists(&record.principal_id).await? {
            return Ok(record);
        }
        self.records
            .remove_if(&record.principal_id, |_, stored| stored.seed.matches(&record.seed));
        debug!(principal = %record.principal_id, "Dropped seed of removed principal");
        Err(SeedError::NotFound(record.principal_id))
    }
}

#[async_trait]
impl SeedStore for MemorySeedStore {
    async fn current_seed(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        if let Some(record) = self.cached(principal) {
            return Ok(record);
        }

        self.ensure_exists(principal).await?;

        // Generate outside the shard lock; losers of the race drop their candidate.
        let candidate = self.generator.generate()?;
        let record = self
            .records
            .entry(principal.clone())
            .or_insert_with(|| {
                debug!(principal = %principal, "Initialized seed");
                SeedRecord {
                    principal_id: principal.clone(),
                    seed: candidate,
                    last_rotated_at_unix: unix_now(),
                }
            })
            .value()
            .clone();

        self.settle(record).await
    }

    async fn rotate(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError> {
        self.ensure_exists(principal).await?;

        let record = match self.records.entry(principal.clone()) {
            Entry::Occupied(mut occupied) => {
                let seed = fresh_seed(self.generator.as_ref(), Some(&occupied.get().seed))?;
                let record = SeedRecord {
                    principal_id: principal.clone(),
                    seed,
                    last_rotated_at_unix: unix_now(),
                };
                occupied.insert(record.clone());
                record
            }
            Entry::Vacant(vacant) => {
                let record = SeedRecord {
                    principal_id: principal.clone(),
                    seed: fresh_seed(self.generator.as_ref(), None)?,
                    last_rotated_at_unix: unix_now(),
                };
                vacant.insert(record.clone());
                record
            }
        };

        self.settle(record).await
    }

    async fn forget(&self, principal: &PrincipalId) -> Result<(), SeedError> {
        self.records.remove(principal);
        Ok(())
    }
}
