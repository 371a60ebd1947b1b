//! Credentials handed to clients and the seed copy they carry.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use super::{PrincipalId, Seed};

/// What kind of artifact a credential is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Short-lived session handle.
    Session,
    /// Persistent remember-me token.
    RememberMe,
}

/// Series id and secret of a remember-me token.
#[derive(Clone)]
pub struct RememberMeToken {
    series_id: String,
    token_secret: SecretString,
}

impl RememberMeToken {
    #[must_use]
    pub fn new(series_id: String, token_secret: SecretString) -> Self {
        Self {
            series_id,
            token_secret,
        }
    }

    #[must_use]
    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    #[must_use]
    pub fn token_secret(&self) -> &str {
        self.token_secret.expose_secret()
    }
}

impl fmt::Debug for RememberMeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RememberMeToken")
            .field("series_id", &self.series_id)
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

/// An issued credential.
///
/// The embedded seed is a copy taken at mint time and cannot be changed
/// afterwards; the credential stays valid only while that copy equals the
/// principal's current seed.
#[derive(Clone, Debug)]
pub struct Credential {
    principal_id: PrincipalId,
    embedded_seed: Seed,
    issued_at_unix: i64,
    remember_me: Option<RememberMeToken>,
}

impl Credential {
    #[must_use]
    pub fn session(principal_id: PrincipalId, embedded_seed: Seed, issued_at_unix: i64) -> Self {
        Self {
            principal_id,
            embedded_seed,
            issued_at_unix,
            remember_me: None,
        }
    }

    #[must_use]
    pub fn remember_me(
        principal_id: PrincipalId,
        embedded_seed: Seed,
        issued_at_unix: i64,
        token: RememberMeToken,
    ) -> Self {
        Self {
            principal_id,
            embedded_seed,
            issued_at_unix,
            remember_me: Some(token),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        if self.remember_me.is_some() {
            CredentialKind::RememberMe
        } else {
            CredentialKind::Session
        }
    }

    #[must_use]
    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    #[must_use]
    pub fn embedded_seed(&self) -> &Seed {
        &self.embedded_seed
    }

    #[must_use]
    pub fn issued_at_unix(&self) -> i64 {
        self.issued_at_unix
    }

    #[must_use]
    pub fn remember_me_token(&self) -> Option<&RememberMeToken> {
        self.remember_me.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_token_presence() {
        let seed = Seed::from_encoded("seed".to_string());
        let session = Credential::session(PrincipalId::from("alice"), seed.clone(), 1);
        assert_eq!(session.kind(), CredentialKind::Session);
        assert!(session.remember_me_token().is_none());

        let token = RememberMeToken::new(
            "series".to_string(),
            SecretString::from("secret".to_string()),
        );
        let persistent = Credential::remember_me(PrincipalId::from("alice"), seed, 1, token);
        assert_eq!(persistent.kind(), CredentialKind::RememberMe);
        assert_eq!(
            persistent.remember_me_token().map(RememberMeToken::series_id),
            Some("series")
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let token = RememberMeToken::new(
            "series".to_string(),
            SecretString::from("hunter2".to_string()),
        );
        let credential = Credential::remember_me(
            PrincipalId::from("alice"),
            Seed::from_encoded("topsecretseed".to_string()),
            1,
            token,
        );
        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("topsecretseed"));
        assert!(debug.contains("series"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&CredentialKind::RememberMe).ok();
        assert_eq!(json.as_deref(), Some("\"remember_me\""));
    }
}
