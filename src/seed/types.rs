//! Value types shared by the seed modules.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

/// Stable identifier of a principal (user account).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque per-principal secret.
///
/// The value is never printed by `Debug` and comparisons run in constant time.
#[derive(Clone)]
pub struct Seed(SecretString);

impl Seed {
    /// Wrap an already encoded seed value, e.g. one read back from storage.
    #[must_use]
    pub fn from_encoded(value: String) -> Self {
        Self(SecretString::from(value))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Constant-time equality against another seed.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.expose()
            .as_bytes()
            .ct_eq(other.expose().as_bytes())
            .into()
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Seed {}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// The authoritative seed of one principal.
#[derive(Clone, Debug)]
pub struct SeedRecord {
    pub principal_id: PrincipalId,
    pub seed: Seed,
    pub last_rotated_at_unix: i64,
}

/// Seconds since the Unix epoch; clamps to zero if the clock is before 1970.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_debug_is_redacted() {
        let seed = Seed::from_encoded("super-secret".to_string());
        let debug = format!("{seed:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(debug, "Seed([REDACTED])");
    }

    #[test]
    fn seed_matches_compares_full_value() {
        let a = Seed::from_encoded("abc".to_string());
        let b = Seed::from_encoded("abc".to_string());
        let prefix = Seed::from_encoded("ab".to_string());
        let other = Seed::from_encoded("abd".to_string());
        assert!(a.matches(&b));
        assert!(!a.matches(&prefix));
        assert!(!a.matches(&other));
        assert_eq!(a, b);
    }

    #[test]
    fn principal_id_round_trips_through_serde() {
        let id = PrincipalId::from("user_7");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"user_7\""));
        assert_eq!(id.to_string(), "user_7");
    }

    #[test]
    fn unix_now_is_positive() {
        assert!(unix_now() > 1_600_000_000);
    }
}
