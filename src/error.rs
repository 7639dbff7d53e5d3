//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - ETL-000-009: Pipeline definition / configuration errors
//! - ETL-010-019: Connection errors (warehouse, credentials, timeouts)
//! - ETL-020-029: Load errors (COPY / INSERT / check query rejected)
//! - ETL-030-039: Assertion errors (data quality gate)
//! - ETL-040-049: Graph errors
//! - ETL-090-099: IO / runtime errors
//!
//! Every variant belongs to exactly one [`ErrorKind`]; the runner decides
//! whether to retry by kind, never by variant.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::warehouse::Scalar;

pub type Result<T> = std::result::Result<T, EtlError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse error taxonomy used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Warehouse unreachable, auth failure, timeout
    Connection,
    /// Statement rejected by the warehouse (malformed data, bad SQL)
    Load,
    /// Quality check mismatch
    Assertion,
    /// Invalid table/credential/query/pipeline definition
    Configuration,
    /// Task panicked or the runtime itself failed
    Execution,
}

impl ErrorKind {
    /// Retrying a connection or load failure may succeed (transient storage
    /// listing races, network blips). Everything else re-fails identically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Load)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Load => "load",
            ErrorKind::Assertion => "assertion",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// One failed quality assertion
#[derive(Debug, Clone, PartialEq)]
pub struct CheckFailure {
    pub sql: String,
    pub observed: Scalar,
    pub expected: Scalar,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' returned {}, expected {}",
            self.sql.trim(),
            self.observed,
            self.expected
        )
    }
}

fn format_failures(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum EtlError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[ETL-001] Failed to parse pipeline: {details}")]
    ParseError { details: String },

    #[error("[ETL-002] Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("[ETL-003] Invalid task name '{name}': must match ^[a-z][a-z0-9_]*$")]
    InvalidTaskName { name: String },

    #[error("[ETL-004] Invalid table name '{name}': expected [schema.]table")]
    InvalidTableName { name: String },

    #[error("[ETL-005] Task '{task}' is missing required field '{field}'")]
    MissingField { task: String, field: String },

    #[error("[ETL-006] Unknown placeholder '{{{placeholder}}}' in key pattern '{pattern}'")]
    UnknownPlaceholder { placeholder: String, pattern: String },

    #[error("[ETL-007] Unknown credential id '{credential_id}'")]
    UnknownCredential { credential_id: String },

    // ═══════════════════════════════════════════
    // CONNECTION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[ETL-010] Warehouse connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("[ETL-011] Credentials '{credential_id}' rejected: {reason}")]
    AuthFailed { credential_id: String, reason: String },

    #[error("[ETL-012] Task '{task}' timed out after {timeout:?}")]
    Timeout { task: String, timeout: Duration },

    // ═══════════════════════════════════════════
    // LOAD ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[ETL-020] Statement failed: {reason}")]
    StatementFailed { reason: String },

    // ═══════════════════════════════════════════
    // ASSERTION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[ETL-030] Data quality check failed! {}", format_failures(.failures))]
    QualityCheckFailed { failures: Vec<CheckFailure> },

    // ═══════════════════════════════════════════
    // GRAPH ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[ETL-040] Duplicate task '{name}'")]
    DuplicateTask { name: String },

    #[error("[ETL-041] Task '{task}' depends on '{dependency}', which is not declared before it")]
    UnknownDependency { task: String, dependency: String },

    // ═══════════════════════════════════════════
    // IO / RUNTIME ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[ETL-090] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[ETL-091] Task '{task}' panicked: {reason}")]
    TaskPanicked { task: String, reason: String },
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::ConnectionFailed { .. }
            | EtlError::AuthFailed { .. }
            | EtlError::Timeout { .. } => ErrorKind::Connection,
            EtlError::StatementFailed { .. } => ErrorKind::Load,
            EtlError::QualityCheckFailed { .. } => ErrorKind::Assertion,
            EtlError::TaskPanicked { .. } => ErrorKind::Execution,
            EtlError::ParseError { .. }
            | EtlError::InvalidConfig { .. }
            | EtlError::InvalidTaskName { .. }
            | EtlError::InvalidTableName { .. }
            | EtlError::MissingField { .. }
            | EtlError::UnknownPlaceholder { .. }
            | EtlError::UnknownCredential { .. }
            | EtlError::DuplicateTask { .. }
            | EtlError::UnknownDependency { .. }
            | EtlError::Io(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_yaml::Error> for EtlError {
    fn from(e: serde_yaml::Error) -> Self {
        EtlError::ParseError {
            details: e.to_string(),
        }
    }
}

impl FixSuggestion for EtlError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            EtlError::ParseError { .. } => Some("Check YAML syntax: indentation and quoting"),
            EtlError::InvalidConfig { .. } => Some("Check sparkify.toml and the pipeline file"),
            EtlError::InvalidTaskName { .. } => {
                Some("Use lowercase snake_case task ids, e.g. load_user_dim_table")
            }
            EtlError::InvalidTableName { .. } => Some("Use schema.table, e.g. public.songplays"),
            EtlError::MissingField { .. } => Some("Add the field to the task definition"),
            EtlError::UnknownPlaceholder { .. } => Some(
                "Supported placeholders: {ds} {ds_nodash} {year} {month} {day} {hour} {ts} {run_id} {interval_start} {interval_end}",
            ),
            EtlError::UnknownCredential { .. } => {
                Some("Declare it under [credentials.<id>] or set AWS_KEY / AWS_SECRET")
            }
            EtlError::ConnectionFailed { .. } => {
                Some("Check WAREHOUSE_URL and that the cluster accepts connections")
            }
            EtlError::AuthFailed { .. } => Some("Rotate the access key or refresh the session token"),
            EtlError::Timeout { .. } => Some("Raise [retry].execution_timeout_secs"),
            EtlError::StatementFailed { .. } => {
                Some("Inspect stl_load_errors for rejected rows, or run the statement manually")
            }
            EtlError::QualityCheckFailed { .. } => {
                Some("Inspect the offending table; re-running without fixing upstream data fails again")
            }
            EtlError::DuplicateTask { .. } => Some("Task ids must be unique within a pipeline"),
            EtlError::UnknownDependency { .. } => {
                Some("Declare upstream tasks before the tasks that depend on them")
            }
            EtlError::Io(_) => Some("Check file path and permissions"),
            EtlError::TaskPanicked { .. } => None,
        }
    }
}
