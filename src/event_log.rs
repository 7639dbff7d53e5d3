//! Run event log
//!
//! Append-only audit trail of one pipeline run.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run level, task level and statement level variants
//! - EventLog: thread-safe, cheap to clone, shared by the runner and tasks
//!
//! Statements are recorded in their redacted form; no credential ever lands
//! here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::warehouse::Scalar;

/// Single event in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since run start (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        pipeline: String,
        run_id: String,
        logical_date: String,
        task_count: usize,
    },
    RunCompleted {
        total_duration_ms: u64,
    },
    RunFailed {
        failed_tasks: Vec<Arc<str>>,
        skipped_tasks: Vec<Arc<str>>,
        total_duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskScheduled {
        task_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    TaskStarted {
        task_id: Arc<str>,
        attempt: u32,
    },
    TaskRetrying {
        task_id: Arc<str>,
        attempt: u32,
        error: String,
        delay_ms: u64,
    },
    TaskSucceeded {
        task_id: Arc<str>,
        attempts: u32,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Arc<str>,
        error: String,
        error_kind: ErrorKind,
        attempts: u32,
    },
    TaskSkipped {
        task_id: Arc<str>,
        upstream: Arc<str>,
    },

    // ═══════════════════════════════════════════
    // STATEMENT LEVEL
    // ═══════════════════════════════════════════
    /// SQL sent to the warehouse (secrets redacted)
    StatementIssued {
        task_id: Arc<str>,
        sql: String,
    },
    QualityCheckEvaluated {
        task_id: Arc<str>,
        sql: String,
        observed: Scalar,
        expected: Scalar,
        passed: bool,
    },
}

impl EventKind {
    /// Extract task_id if event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskScheduled { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::TaskSucceeded { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskSkipped { task_id, .. }
            | Self::StatementIssued { task_id, .. }
            | Self::QualityCheckEvaluated { task_id, .. } => Some(task_id),
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::RunFailed { .. } => None,
        }
    }

    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::RunFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event, returns its id
    pub fn emit(&self, kind: EventKind) -> u64 {
        // id and push under one lock so ids stay in log order
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    pub fn filter_task(&self, task_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .collect()
    }

    pub fn run_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_run_event())
            .collect()
    }

    /// Redacted statements issued by a task, in order
    pub fn statements(&self, task_id: &str) -> Vec<String> {
        self.filter_task(task_id)
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::StatementIssued { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Serialize to JSON for `--events`
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
