use super::PrincipalId;
use thiserror::Error;

/// Failures of the seed machinery itself.
///
/// These are system outcomes surfaced to the caller. Ordinary authentication
/// failures are reported through [`Rejection`] instead.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("principal not found: {0}")]
    NotFound(PrincipalId),
    #[error("secure entropy source unavailable")]
    EntropySourceUnavailable(#[source] rand::Error),
    #[error("storage backend error")]
    Storage(#[from] sqlx::Error),
}

/// Why a presented credential was refused.
///
/// Every variant means "re-authenticate". Only [`Rejection::ReplayDetected`]
/// is a security event; the rest are expected outcomes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Rejection {
    #[error("principal no longer exists")]
    PrincipalGone,
    #[error("credential seed does not match the current seed")]
    SeedMismatch,
    #[error("unknown remember-me token series")]
    UnknownSeries,
    #[error("remember-me token expired")]
    Expired,
    #[error("remember-me token reuse detected")]
    ReplayDetected,
}

impl Rejection {
    /// Stable label used in logs and response bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrincipalGone => "principal_gone",
            Self::SeedMismatch => "seed_mismatch",
            Self::UnknownSeries => "unknown_series",
            Self::Expired => "expired",
            Self::ReplayDetected => "replay_detected",
        }
    }
}
