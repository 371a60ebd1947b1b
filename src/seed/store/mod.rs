//! Authoritative per-principal seed storage.
//!
//! Two backends implement [`SeedStore`]: [`MemorySeedStore`] (sharded concurrent
//! map) and [`PgSeedStore`] (`principal_seeds` table). Both guarantee:
//!
//! - lazy initialization has a single winner: concurrent first reads for the
//!   same principal all observe the same seed;
//! - `rotate` is linearizable with respect to `current_seed` for that principal;
//! - operations on different principals never serialize on a shared lock.

mod memory;
mod postgres;

pub use memory::MemorySeedStore;
pub use postgres::PgSeedStore;

use async_trait::async_trait;

use super::{PrincipalId, Seed, SeedError, SeedGenerator, SeedRecord};

/// Attempts to draw a seed that differs from the one being replaced.
pub(crate) const ROTATE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait SeedStore: Send + Sync {
    /// Current seed of the principal, creating it on first access.
    ///
    /// # Errors
    /// [`SeedError::NotFound`] for an unknown principal, or generator/storage errors.
    async fn current_seed(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError>;

    /// Replace the principal's seed with a fresh one and return the new record.
    ///
    /// # Errors
    /// [`SeedError::NotFound`] for an unknown principal, or generator/storage errors.
    async fn rotate(&self, principal: &PrincipalId) -> Result<SeedRecord, SeedError>;

    /// Drop the principal's record, if any.
    ///
    /// # Errors
    /// Storage errors only.
    async fn forget(&self, principal: &PrincipalId) -> Result<(), SeedError>;
}

/// Draw a seed that differs from `previous`.
///
/// A collision of 256-bit values is not expected; the retry keeps a rotated-out
/// seed from ever being handed back.
pub(crate) fn fresh_seed(
    generator: &dyn SeedGenerator,
    previous: Option<&Seed>,
) -> Result<Seed, SeedError> {
    let mut candidate = generator.generate()?;
    for _ in 1..ROTATE_ATTEMPTS {
        match previous {
            Some(previous) if previous.matches(&candidate) => {
                candidate = generator.generate()?;
            }
            _ => break,
        }
    }
    Ok(candidate)
}
