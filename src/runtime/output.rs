//! Run report - the per-task outcome of one invocation
//!
//! - `RunReport::render_summary`: colored table printed by the CLI
//! - `RunReport::to_json`: machine-readable form

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::{json, Value};

use crate::error::EtlError;
use crate::store::TaskState;
use crate::task::TaskKind;

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: Arc<str>,
    pub kind: TaskKind,
    pub state: TaskState,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub pipeline: String,
    pub run_id: String,
    pub logical_date: DateTime<Utc>,
    /// Topological order
    pub tasks: Vec<TaskReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.state.is_succeeded())
    }

    pub fn state(&self, task_id: &str) -> Option<&TaskState> {
        self.tasks
            .iter()
            .find(|t| &*t.task_id == task_id)
            .map(|t| &t.state)
    }

    fn ids_where(&self, pred: impl Fn(&TaskState) -> bool) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| pred(&t.state))
            .map(|t| &*t.task_id)
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.ids_where(TaskState::is_succeeded)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids_where(|s| matches!(s, TaskState::Failed { .. }))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.ids_where(|s| matches!(s, TaskState::Skipped { .. }))
    }

    /// Error of the first failed task, in topological order
    pub fn first_error(&self) -> Option<&EtlError> {
        self.tasks.iter().find_map(|t| t.state.error())
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let width = self
            .tasks
            .iter()
            .map(|t| t.task_id.len())
            .max()
            .unwrap_or(0);

        for task in &self.tasks {
            let (symbol, detail) = match &task.state {
                TaskState::Succeeded { attempts, duration } => (
                    "✓".green(),
                    format!(
                        "{:.1}s, {} attempt{}",
                        duration.as_secs_f32(),
                        attempts,
                        if *attempts == 1 { "" } else { "s" }
                    ),
                ),
                TaskState::Failed { error, attempts } => (
                    "✗".red(),
                    format!("{} after {} attempt(s): {}", error.kind(), attempts, error),
                ),
                TaskState::Skipped { upstream } => {
                    ("⊘".yellow(), format!("skipped, upstream '{}' failed", upstream))
                }
                TaskState::Running { attempt } => ("…".dimmed(), format!("attempt {}", attempt)),
                TaskState::Pending => ("·".dimmed(), "never started".to_string()),
            };
            out.push_str(&format!(
                "  {} {:<width$} {:<9} {}\n",
                symbol,
                task.task_id,
                task.kind.to_string(),
                detail.dimmed(),
                width = width
            ));
        }
        out
    }

    pub fn to_json(&self) -> Value {
        let tasks: Vec<Value> = self
            .tasks
            .iter()
            .map(|t| {
                let mut entry = json!({
                    "task_id": &*t.task_id,
                    "kind": t.kind,
                    "state": t.state.label(),
                });
                match &t.state {
                    TaskState::Succeeded { attempts, duration } => {
                        entry["attempts"] = json!(attempts);
                        entry["duration_ms"] = json!(duration.as_millis() as u64);
                    }
                    TaskState::Failed { error, attempts } => {
                        entry["attempts"] = json!(attempts);
                        entry["error"] = json!(error.to_string());
                        entry["error_kind"] = json!(t.state.error_kind());
                    }
                    TaskState::Skipped { upstream } => {
                        entry["upstream"] = json!(&**upstream);
                    }
                    TaskState::Running { attempt } => {
                        entry["attempt"] = json!(attempt);
                    }
                    TaskState::Pending => {}
                }
                entry
            })
            .collect();

        json!({
            "pipeline": self.pipeline,
            "run_id": self.run_id,
            "logical_date": self.logical_date.to_rfc3339(),
            "success": self.is_success(),
            "duration_ms": self.duration.as_millis() as u64,
            "tasks": tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            pipeline: "sparkify".into(),
            run_id: "run-1".into(),
            logical_date: Utc::now(),
            tasks: vec![
                TaskReport {
                    task_id: "stage_events".into(),
                    kind: TaskKind::Stage,
                    state: TaskState::Failed {
                        error: Arc::new(EtlError::ConnectionFailed {
                            reason: "refused".into(),
                        }),
                        attempts: 3,
                    },
                },
                TaskReport {
                    task_id: "stage_songs".into(),
                    kind: TaskKind::Stage,
                    state: TaskState::Succeeded {
                        attempts: 1,
                        duration: Duration::from_millis(20),
                    },
                },
                TaskReport {
                    task_id: "load_songplays_fact_table".into(),
                    kind: TaskKind::FactLoad,
                    state: TaskState::Skipped {
                        upstream: "stage_events".into(),
                    },
                },
            ],
            duration: Duration::from_millis(25),
        }
    }

    #[test]
    fn partitions_tasks_by_state() {
        let r = report();
        assert!(!r.is_success());
        assert_eq!(r.failed(), ["stage_events"]);
        assert_eq!(r.succeeded(), ["stage_songs"]);
        assert_eq!(r.skipped(), ["load_songplays_fact_table"]);
        assert!(matches!(r.first_error(), Some(EtlError::ConnectionFailed { .. })));
    }

    #[test]
    fn summary_and_json_name_every_task() {
        let r = report();
        let summary = r.render_summary();
        assert!(summary.contains("stage_events"));
        assert!(summary.contains("upstream 'stage_events' failed"));

        let json = r.to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["tasks"][0]["error_kind"], "connection");
        assert_eq!(json["tasks"][2]["upstream"], "stage_events");
    }
}
