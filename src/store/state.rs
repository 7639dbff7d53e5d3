//! StateStore - per-run task states on DashMap
//!
//! Written by the runner only; read by anything holding a clone. States live
//! for one invocation and are never persisted.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{ErrorKind, EtlError};

#[derive(Debug, Clone)]
pub enum TaskState {
    Pending,
    Running {
        attempt: u32,
    },
    Succeeded {
        attempts: u32,
        duration: Duration,
    },
    /// Error kept exactly as the task returned it
    Failed {
        error: Arc<EtlError>,
        attempts: u32,
    },
    Skipped {
        /// The failed task that caused the skip
        upstream: Arc<str>,
    },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded { .. } | TaskState::Failed { .. } | TaskState::Skipped { .. }
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskState::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&EtlError> {
        match self {
            TaskState::Failed { error, .. } => Some(&**error),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(EtlError::kind)
    }

    /// Short label for summaries
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running { .. } => "running",
            TaskState::Succeeded { .. } => "succeeded",
            TaskState::Failed { .. } => "failed",
            TaskState::Skipped { .. } => "skipped",
        }
    }
}

/// Thread-safe task state storage
#[derive(Clone, Default)]
pub struct StateStore {
    states: Arc<DashMap<Arc<str>, TaskState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, task_id: Arc<str>, state: TaskState) {
        self.states.insert(task_id, state);
    }

    pub fn get(&self, task_id: &str) -> Option<TaskState> {
        self.states.get(task_id).map(|s| s.value().clone())
    }

    /// Unknown tasks count as pending
    pub fn state(&self, task_id: &str) -> TaskState {
        self.get(task_id).unwrap_or(TaskState::Pending)
    }

    pub fn is_succeeded(&self, task_id: &str) -> bool {
        self.states
            .get(task_id)
            .is_some_and(|s| s.value().is_succeeded())
    }

    pub fn is_terminal(&self, task_id: &str) -> bool {
        self.states
            .get(task_id)
            .is_some_and(|s| s.value().is_terminal())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("len", &self.len())
            .finish()
    }
}
