//! In-memory warehouse for tests and dry runs
//!
//! Simulates just enough of a warehouse for the pipeline's statements:
//!
//! | Statement | Effect |
//! |-----------|--------|
//! | `DELETE FROM t` | clears `t` |
//! | `COPY t FROM 's3://…'` | appends every registered object under that prefix |
//! | `INSERT INTO t <query>` | appends the rows registered for `<query>` |
//! | `SELECT COUNT(*) FROM t [WHERE c IS NULL]` | evaluated against `t` |
//!
//! Anything else is accepted and recorded. Failures and latency can be
//! injected per statement pattern to exercise the runner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;

use super::{Row, Scalar, WarehouseClient};
use crate::error::{EtlError, ErrorKind, Result};

static DELETE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)^\s*DELETE\s+FROM\s+([\w."]+)\s*;?\s*$"#).unwrap());

static COPY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)^\s*COPY\s+([\w."]+)\s+FROM\s+'([^']*)'"#).unwrap());

static INSERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)^\s*INSERT\s+INTO\s+([\w."]+)\s+(.+)$"#).unwrap());

static COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*SELECT\s+COUNT\(\*\)\s+FROM\s+([\w."]+)(?:\s+WHERE\s+("?\w+"?)\s+IS\s+NULL)?\s*;?\s*$"#,
    )
    .unwrap()
});

/// One statement seen by the warehouse
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    /// Sequence number taken when the statement arrived
    pub started: u64,
    /// Sequence number taken when it finished
    pub finished: u64,
    pub sql: String,
    pub ok: bool,
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    pattern: String,
    kind: ErrorKind,
    /// None = fail forever
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    /// s3 path -> rows in that object
    objects: Vec<(String, Vec<Row>)>,
    /// normalized transform query -> rows it produces
    transforms: HashMap<String, Vec<Row>>,
    /// normalized query -> scripted result
    scripted: HashMap<String, Vec<Row>>,
    failures: Vec<InjectedFailure>,
    log: Vec<StatementRecord>,
    /// Unknown relations and columns count as empty
    permissive: bool,
}

/// Table-simulating [`WarehouseClient`]
#[derive(Clone, Default)]
pub struct InMemoryWarehouse {
    state: Arc<Mutex<State>>,
    seq: Arc<AtomicU64>,
    latency: Option<(Duration, Duration)>,
}

/// Lowercase, unquote, default schema `public`
fn canonical_table(name: &str) -> String {
    let name = name.replace('"', "").to_ascii_lowercase();
    if name.contains('.') {
        name
    } else {
        format!("public.{}", name)
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .trim()
        .to_string()
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table and its column names
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.state.lock().tables.insert(
            canonical_table(name),
            Table {
                columns: columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Register an object in storage (full `s3://bucket/key` path)
    pub fn with_object(self, path: &str, rows: Vec<Row>) -> Self {
        self.state.lock().objects.push((path.to_string(), rows));
        self
    }

    /// Register the rows a transform query produces
    pub fn with_transform(self, query: &str, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .transforms
            .insert(normalize_sql(query), rows);
        self
    }

    /// Script the result of a query that can't be evaluated
    pub fn with_query_result(self, query: &str, rows: Vec<Row>) -> Self {
        self.state.lock().scripted.insert(normalize_sql(query), rows);
        self
    }

    /// Treat undeclared tables and columns as empty instead of failing
    pub fn permissive(self) -> Self {
        self.state.lock().permissive = true;
        self
    }

    /// Random latency per statement, uniformly in `[min, max]`
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }

    /// Fail every statement containing `pattern`
    pub fn fail_on(self, pattern: &str, kind: ErrorKind) -> Self {
        self.push_failure(pattern, kind, None);
        self
    }

    /// Fail the next `times` statements containing `pattern`
    pub fn fail_times(self, pattern: &str, kind: ErrorKind, times: u32) -> Self {
        self.push_failure(pattern, kind, Some(times));
        self
    }

    fn push_failure(&self, pattern: &str, kind: ErrorKind, remaining: Option<u32>) {
        self.state.lock().failures.push(InjectedFailure {
            pattern: pattern.to_string(),
            kind,
            remaining,
        });
    }

    /// Replace a table's rows directly
    pub fn set_rows(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.state.lock();
        state
            .tables
            .entry(canonical_table(table))
            .or_insert_with(|| Table {
                columns: Vec::new(),
                rows: Vec::new(),
            })
            .rows = rows;
    }

    /// Current rows of a table (empty if unknown)
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(&canonical_table(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every statement seen, in completion order
    pub fn statements(&self) -> Vec<StatementRecord> {
        self.state.lock().log.clone()
    }

    /// Statements containing `needle`
    pub fn statements_matching(&self, needle: &str) -> Vec<StatementRecord> {
        self.statements()
            .into_iter()
            .filter(|s| s.sql.contains(needle))
            .collect()
    }

    async fn simulate_latency(&self) {
        if let Some((min, max)) = self.latency {
            let delay = if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            };
            tokio::time::sleep(delay).await;
        }
    }

    fn take_injected_failure(state: &mut State, sql: &str) -> Option<EtlError> {
        let failure = state
            .failures
            .iter_mut()
            .find(|f| sql.contains(&f.pattern) && f.remaining != Some(0))?;
        if let Some(n) = failure.remaining.as_mut() {
            *n -= 1;
        }
        let reason = format!("injected failure on '{}'", failure.pattern);
        Some(match failure.kind {
            ErrorKind::Connection => EtlError::ConnectionFailed { reason },
            ErrorKind::Load => EtlError::StatementFailed { reason },
            _ => EtlError::InvalidConfig { reason },
        })
    }

    /// Run `apply` under the lock, recording the statement either way
    async fn run<T>(
        &self,
        sql: &str,
        apply: impl FnOnce(&mut State) -> Result<T>,
    ) -> Result<T> {
        let started = self.seq.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut state = self.state.lock();
        let result = match Self::take_injected_failure(&mut state, sql) {
            Some(err) => Err(err),
            None => apply(&mut state),
        };
        let finished = self.seq.fetch_add(1, Ordering::SeqCst);
        state.log.push(StatementRecord {
            started,
            finished,
            sql: sql.to_string(),
            ok: result.is_ok(),
        });
        result
    }
}

impl State {
    fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables
            .entry(canonical_table(name))
            .or_insert_with(|| Table {
                columns: Vec::new(),
                rows: Vec::new(),
            })
    }

    fn apply_statement(&mut self, sql: &str) -> Result<()> {
        if let Some(caps) = DELETE_RE.captures(sql) {
            self.table_mut(&caps[1]).rows.clear();
        } else if let Some(caps) = COPY_RE.captures(sql) {
            let location = caps[2].to_string();
            let rows: Vec<Row> = self
                .objects
                .iter()
                .filter(|(path, _)| path.starts_with(&location))
                .flat_map(|(_, rows)| rows.iter().cloned())
                .collect();
            self.table_mut(&caps[1]).rows.extend(rows);
        } else if let Some(caps) = INSERT_RE.captures(sql) {
            let rows = self
                .transforms
                .get(&normalize_sql(&caps[2]))
                .cloned()
                .unwrap_or_default();
            self.table_mut(&caps[1]).rows.extend(rows);
        }
        Ok(())
    }

    fn evaluate_query(&self, sql: &str) -> Result<Vec<Row>> {
        if let Some(rows) = self.scripted.get(&normalize_sql(sql)) {
            return Ok(rows.clone());
        }

        let Some(caps) = COUNT_RE.captures(sql) else {
            return Ok(Vec::new());
        };

        let table_name = canonical_table(&caps[1]);
        let Some(table) = self.tables.get(&table_name) else {
            if self.permissive {
                return Ok(vec![vec![Scalar::Int(0)]]);
            }
            return Err(EtlError::StatementFailed {
                reason: format!("relation \"{}\" does not exist", table_name),
            });
        };

        let count = match caps.get(2) {
            None => table.rows.len(),
            Some(column) => {
                let column = column.as_str().replace('"', "").to_ascii_lowercase();
                match table.columns.iter().position(|c| *c == column) {
                    Some(idx) => table
                        .rows
                        .iter()
                        .filter(|row| row.get(idx).map_or(true, Scalar::is_null))
                        .count(),
                    None if self.permissive && table.rows.is_empty() => 0,
                    None => {
                        return Err(EtlError::StatementFailed {
                            reason: format!("column \"{}\" does not exist", column),
                        })
                    }
                }
            }
        };

        Ok(vec![vec![Scalar::Int(count as i64)]])
    }
}

#[async_trait]
impl WarehouseClient for InMemoryWarehouse {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.run(sql, |state| state.apply_statement(sql)).await
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.run(sql, |state| state.evaluate_query(sql)).await
    }
}
