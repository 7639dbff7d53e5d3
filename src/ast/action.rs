//! Task action blocks - the 4 verbs
//!
//! ```yaml
//! - id: stage_events
//!   stage: { table: public.staging_events, bucket: udacity-dend, key: log-data/ }
//! - id: load_songplays_fact_table
//!   fact: { table: public.songplays, query: "SELECT ..." }
//! - id: load_user_dim_table
//!   dimension: { table: public.users, query: "SELECT ..." }
//! - id: data_quality_checks
//!   quality: { checks: [{ sql: "SELECT COUNT(*) ...", expected: 0 }] }
//! ```

use serde::Deserialize;

use crate::config::DEFAULT_CREDENTIAL_ID;
use crate::warehouse::Scalar;

/// Stage action - bulk copy from object storage
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StageParams {
    pub table: String,
    /// Credential id resolved at run time
    #[serde(default = "default_credentials")]
    pub credentials: String,
    pub bucket: String,
    /// Key pattern, may use run context placeholders
    pub key: String,
    /// `auto` or an `s3://` JSONPaths file
    #[serde(default = "default_json_path")]
    pub json_path: String,
    #[serde(default)]
    pub region: Option<String>,
}

fn default_credentials() -> String {
    DEFAULT_CREDENTIAL_ID.to_string()
}

fn default_json_path() -> String {
    "auto".to_string()
}

/// Fact or dimension load
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoadParams {
    pub table: String,
    /// SELECT producing the rows to insert
    pub query: String,
    /// Keep existing rows (not idempotent)
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CheckDef {
    pub sql: String,
    pub expected: Scalar,
}

/// Quality gate action
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QualityParams {
    #[serde(default)]
    pub checks: Vec<CheckDef>,
    /// Stop at the first mismatch instead of reporting all of them
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ActionDef {
    Stage { stage: StageParams },
    Fact { fact: LoadParams },
    Dimension { dimension: LoadParams },
    Quality { quality: QualityParams },
}
