//! Seed and token generation from the operating system CSPRNG.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use tracing::error;

use super::{Seed, SeedError};

/// Random bytes behind every seed and remember-me token (256 bits).
pub const SEED_BYTES: usize = 32;

/// Source of fresh seeds.
pub trait SeedGenerator: Send + Sync {
    /// Produce a new unpredictable seed.
    ///
    /// # Errors
    /// Returns [`SeedError::EntropySourceUnavailable`] when secure randomness
    /// cannot be obtained. Implementations must never fall back to a weaker source.
    fn generate(&self) -> Result<Seed, SeedError>;
}

/// Generator backed by [`OsRng`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSeedGenerator;

impl SeedGenerator for OsSeedGenerator {
    fn generate(&self) -> Result<Seed, SeedError> {
        random_token().map(Seed::from_encoded)
    }
}

/// URL-safe random token of [`SEED_BYTES`] bytes.
///
/// Used for remember-me series ids, token secrets and session tokens.
///
/// # Errors
/// Returns [`SeedError::EntropySourceUnavailable`] if the OS source fails.
pub fn random_token() -> Result<String, SeedError> {
    let mut bytes = [0u8; SEED_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        error!("Failed to read from the OS entropy source: {err}");
        SeedError::EntropySourceUnavailable(err)
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
