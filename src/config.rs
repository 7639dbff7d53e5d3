//! Runtime configuration (`sparkify.toml`)
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`WAREHOUSE_URL`, `AWS_KEY`, `AWS_SECRET`, `AWS_SESSION_TOKEN`)
//! 2. Config file (`sparkify.toml` or `--config <path>`)
//! 3. Defaults
//!
//! Environment variables are read once, here. Nothing downstream looks at the
//! process environment: credentials reach the stage tasks only through the
//! [`StaticCredentialProvider`](crate::credentials::StaticCredentialProvider)
//! built from this struct.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialConfig;
use crate::error::{EtlError, Result};
use crate::runtime::RetryPolicy;
use crate::warehouse::WarehouseConfig;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sparkify.toml";

/// Credential id the `AWS_KEY` / `AWS_SECRET` variables populate
pub const DEFAULT_CREDENTIAL_ID: &str = "aws_credentials";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EtlConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// Object-store credentials by id
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialConfig>,
}

/// `[retry]` - applied uniformly to every task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per task, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// Per-attempt timeout (none = unbounded)
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    300
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
            execution_timeout_secs: None,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_secs(self.delay_secs));
        match self.execution_timeout_secs {
            Some(secs) => policy.with_timeout(Duration::from_secs(secs)),
            None => policy,
        }
    }
}

/// `[runner]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Upper bound on concurrently running tasks (none = unlimited)
    #[serde(default)]
    pub max_active_tasks: Option<usize>,
}

impl EtlConfig {
    /// Load from an explicit path (must exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EtlError::InvalidConfig {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    /// Load `sparkify.toml` from the working directory, defaults if absent
    pub fn load_default() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| EtlError::InvalidConfig {
            reason: format!("Failed to parse config file: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables over file values
    pub fn with_env(self) -> Self {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Merge variables from any lookup (tests pass a map)
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("WAREHOUSE_URL") {
            self.warehouse.url = url;
        }

        let key = non_empty("AWS_KEY");
        let secret = non_empty("AWS_SECRET");
        if key.is_some() || secret.is_some() {
            let entry = self
                .credentials
                .entry(DEFAULT_CREDENTIAL_ID.to_string())
                .or_default();
            if let Some(key) = key {
                entry.access_key = key;
            }
            if let Some(secret) = secret {
                entry.secret_key = secret;
            }
            if let Some(token) = non_empty("AWS_SESSION_TOKEN") {
                entry.session_token = Some(token);
            }
        }

        self
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(EtlError::InvalidConfig {
                reason: "[retry].max_attempts must be at least 1".into(),
            });
        }
        if self.runner.max_active_tasks == Some(0) {
            return Err(EtlError::InvalidConfig {
                reason: "[runner].max_active_tasks must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Mask a secret for display
///
/// Shows the first 4 characters, e.g. `AKIA****`
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

/// Mask the password component of a connection URL
pub fn mask_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
        None => url.to_string(),
    }
}
