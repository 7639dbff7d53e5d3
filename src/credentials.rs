//! Object-store credentials
//!
//! A [`CredentialProvider`] resolves a credential id to a time-scoped key
//! pair. The bundled [`StaticCredentialProvider`] serves keys passed in at
//! construction and stamps each resolution with `now + ttl`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::mask_secret;
use crate::error::{EtlError, Result};

/// Resolved access credentials
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &mask_secret(&self.access_key))
            .field("secret_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// `[credentials.<id>]` entry
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialConfig {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Lifetime of a resolved credential
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            session_token: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("access_key", &mask_secret(&self.access_key))
            .field("secret_key", &mask_secret(&self.secret_key))
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// Resolves credential ids to access credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fails with a `Configuration` error for unknown ids and a
    /// `Connection` (auth) error when the identity can't be resolved.
    async fn resolve(&self, credential_id: &str) -> Result<Credentials>;
}

/// Credentials handed over explicitly at construction
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    entries: BTreeMap<String, CredentialConfig>,
}

impl StaticCredentialProvider {
    pub fn new(entries: BTreeMap<String, CredentialConfig>) -> Self {
        Self { entries }
    }

    /// Single entry with a one hour ttl
    pub fn single(
        credential_id: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            credential_id.into(),
            CredentialConfig {
                access_key: access_key.into(),
                secret_key: secret_key.into(),
                ..Default::default()
            },
        );
        Self { entries }
    }

    pub fn contains(&self, credential_id: &str) -> bool {
        self.entries.contains_key(credential_id)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn resolve(&self, credential_id: &str) -> Result<Credentials> {
        let entry = self
            .entries
            .get(credential_id)
            .ok_or_else(|| EtlError::UnknownCredential {
                credential_id: credential_id.to_string(),
            })?;

        if entry.access_key.is_empty() || entry.secret_key.is_empty() {
            return Err(EtlError::AuthFailed {
                credential_id: credential_id.to_string(),
                reason: "access key or secret key is empty".into(),
            });
        }

        let ttl = ChronoDuration::try_seconds(i64::try_from(entry.ttl_secs).unwrap_or(i64::MAX))
            .unwrap_or(ChronoDuration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Credentials {
            access_key: entry.access_key.clone(),
            secret_key: entry.secret_key.clone(),
            session_token: entry.session_token.clone(),
            expires_at,
        })
    }
}
