use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::{
    Credential, CredentialMinter, PrincipalId, SeedError, SeedRecord, SeedStore, TokenSeriesStore,
};

/// What happens to the credential of the request that asked for the rotation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RemintPolicy {
    /// Re-mint the initiator's credential under the new seed so it stays signed in.
    #[default]
    KeepInitiator,
    /// Every credential dies, the initiator's included.
    LogoutEverywhere,
}

impl RemintPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepInitiator => "keep-initiator",
            Self::LogoutEverywhere => "logout-everywhere",
        }
    }
}

impl fmt::Display for RemintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemintPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "keep-initiator" => Ok(Self::KeepInitiator),
            "logout-everywhere" => Ok(Self::LogoutEverywhere),
            other => Err(format!("invalid remint policy: {other}")),
        }
    }
}

/// Result of a rotation.
#[derive(Clone, Debug)]
pub struct Rotation {
    pub record: SeedRecord,
    /// The initiator's replacement credential, when the policy keeps it signed in.
    pub reminted: Option<Credential>,
}

pub struct SeedRotator {
    seeds: Arc<dyn SeedStore>,
    tokens: Arc<dyn TokenSeriesStore>,
    minter: Arc<CredentialMinter>,
    policy: RemintPolicy,
}

impl SeedRotator {
    #[must_use]
    pub fn new(
        seeds: Arc<dyn SeedStore>,
        tokens: Arc<dyn TokenSeriesStore>,
        minter: Arc<CredentialMinter>,
        policy: RemintPolicy,
    ) -> Self {
        Self {
            seeds,
            tokens,
            minter,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> RemintPolicy {
        self.policy
    }

    /// Rotate the principal's seed, invalidating every credential minted before.
    ///
    /// Always changes the seed. Stored remember-me series of the principal are
    /// purged on a best-effort basis; they are already dead once the seed moves.
    /// With [`RemintPolicy::KeepInitiator`], an `initiator` credential belonging
    /// to the same principal is re-minted (same kind) from the record this
    /// rotation produced, even if another rotation has landed since.
    ///
    /// # Errors
    /// [`SeedError::NotFound`], entropy or storage errors from the rotation or
    /// the re-mint.
    #[instrument(skip_all, fields(principal = %principal, policy = %self.policy))]
    pub async fn rotate_for(
        &self,
        principal: &PrincipalId,
        initiator: Option<&Credential>,
    ) -> Result<Rotation, SeedError> {
        let record = self.seeds.rotate(principal).await?;
        info!("Rotated seed");

        match self.tokens.revoke_all(principal).await {
            Ok(purged) => info!(purged, "Purged remember-me series"),
            Err(err) => warn!("Failed to purge remember-me series: {err}"),
        }

        let reminted = match (self.policy, initiator) {
            (RemintPolicy::KeepInitiator, Some(initiator))
                if initiator.principal_id() == principal =>
            {
                Some(self.minter.issue(record.clone(), initiator.kind()).await?)
            }
            _ => None,
        };

        Ok(Rotation { record, reminted })
    }
}
