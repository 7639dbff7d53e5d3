//! Quality gate - scalar assertions over the loaded tables
//!
//! Checks run in declaration order. By default every check is evaluated and
//! all mismatches come back in one error; `fail_fast` stops at the first.

use tracing::{info, warn};

use crate::error::{CheckFailure, EtlError, Result};
use crate::event_log::EventKind;
use crate::warehouse::{Row, Scalar};

use super::TaskEnv;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    pub sql: String,
    pub expected: Scalar,
}

impl QualityCheck {
    pub fn new(sql: impl Into<String>, expected: impl Into<Scalar>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(EtlError::InvalidConfig {
                reason: "quality check query is empty".into(),
            });
        }
        Ok(Self {
            sql,
            expected: expected.into(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityGate {
    checks: Vec<QualityCheck>,
    fail_fast: bool,
}

/// First column of the first row; NULL when there is none
fn observed_value(rows: &[Row]) -> Scalar {
    rows.first()
        .and_then(|row| row.first())
        .cloned()
        .unwrap_or(Scalar::Null)
}

impl QualityGate {
    pub fn new(checks: Vec<QualityCheck>) -> Self {
        Self {
            checks,
            fail_fast: false,
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn checks(&self) -> &[QualityCheck] {
        &self.checks
    }

    pub(crate) async fn execute(&self, env: &TaskEnv) -> Result<()> {
        let mut failures = Vec::new();

        for check in &self.checks {
            let rows = env.query(&check.sql).await?;
            let observed = observed_value(&rows);
            let passed = observed == check.expected;

            env.events.emit(EventKind::QualityCheckEvaluated {
                task_id: env.task_id.clone(),
                sql: check.sql.clone(),
                observed: observed.clone(),
                expected: check.expected.clone(),
                passed,
            });

            if passed {
                info!(task = %env.task_id, sql = %check.sql.trim(), observed = %observed, "Data quality check passed");
                continue;
            }

            warn!(
                task = %env.task_id,
                sql = %check.sql.trim(),
                observed = %observed,
                expected = %check.expected,
                "Data quality check failed"
            );
            failures.push(CheckFailure {
                sql: check.sql.clone(),
                observed,
                expected: check.expected.clone(),
            });
            if self.fail_fast {
                break;
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EtlError::QualityCheckFailed { failures })
        }
    }
}
