//! Pipeline Runner - completion-driven DAG execution with tokio
//!
//! - JoinSet for parallel task collection; readiness is recomputed after every
//!   completion, so a fast branch never waits for a slow sibling
//! - optional Semaphore bounding concurrently running attempts
//! - one RetryPolicy for every task
//! - a task that exhausts its attempts skips everything downstream of it

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::context::RunContext;
use crate::credentials::CredentialProvider;
use crate::dag::PipelineGraph;
use crate::error::{EtlError, Result};
use crate::event_log::{EventKind, EventLog};
use crate::store::{StateStore, TaskState};
use crate::task::{Task, TaskEnv};
use crate::warehouse::WarehouseClient;

use super::output::{RunReport, TaskReport};
use super::retry::RetryPolicy;

/// Final result of one task, after retries
struct TaskOutcome {
    task_id: Arc<str>,
    result: Result<()>,
    attempts: u32,
    duration: Duration,
}

/// DAG pipeline runner with event sourcing
///
/// One runner per invocation: task states are reset at the start of `run`.
pub struct Runner {
    graph: Arc<PipelineGraph>,
    warehouse: Arc<dyn WarehouseClient>,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
    max_active_tasks: Option<usize>,
    show_progress: bool,
    states: StateStore,
    event_log: EventLog,
}

impl Runner {
    pub fn new(
        graph: PipelineGraph,
        warehouse: Arc<dyn WarehouseClient>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            warehouse,
            credentials,
            policy: RetryPolicy::default(),
            max_active_tasks: None,
            show_progress: false,
            states: StateStore::new(),
            event_log: EventLog::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound concurrently running tasks (`None` or `0` = unlimited)
    pub fn with_max_active_tasks(mut self, limit: Option<usize>) -> Self {
        self.max_active_tasks = limit.filter(|n| *n > 0);
        self
    }

    /// Print per-task progress lines to stdout
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Tasks not yet started whose dependencies all succeeded
    fn ready_tasks(&self, started: &HashSet<Arc<str>>) -> Vec<Arc<Task>> {
        self.graph
            .iter()
            .filter(|task| !started.contains(task.name()))
            .filter(|task| {
                task.dependencies()
                    .iter()
                    .all(|dep| self.states.is_succeeded(dep))
            })
            .cloned()
            .collect()
    }

    fn spawn_task(
        &self,
        join_set: &mut JoinSet<TaskOutcome>,
        task: Arc<Task>,
        context: &Arc<RunContext>,
        limiter: Option<Arc<Semaphore>>,
    ) {
        let env = TaskEnv {
            task_id: Arc::clone(task.id()),
            warehouse: Arc::clone(&self.warehouse),
            credentials: Arc::clone(&self.credentials),
            context: Arc::clone(context),
            events: self.event_log.clone(),
        };
        let policy = self.policy.clone();
        let states = self.states.clone();

        join_set.spawn(async move {
            let task_id = Arc::clone(&env.task_id);
            let start = Instant::now();

            let attempts = policy.execute(
                |attempt| {
                    let env = env.clone();
                    let task = Arc::clone(&task);
                    let limiter = limiter.clone();
                    let states = states.clone();
                    let policy = &policy;
                    async move {
                        let _permit = match limiter {
                            Some(sem) => Some(sem.acquire_owned().await.map_err(|_| {
                                EtlError::TaskPanicked {
                                    task: env.task_id.to_string(),
                                    reason: "concurrency limiter closed".into(),
                                }
                            })?),
                            None => None,
                        };
                        states.set(Arc::clone(&env.task_id), TaskState::Running { attempt });
                        env.events.emit(EventKind::TaskStarted {
                            task_id: Arc::clone(&env.task_id),
                            attempt,
                        });
                        // Timeout starts once the slot is held
                        policy
                            .bounded(&env.task_id, task.action().execute(&env))
                            .await
                    }
                },
                |attempt, err, delay| {
                    warn!(task = %task_id, attempt, error = %err, "Attempt failed, retrying in {:?}", delay);
                    env.events.emit(EventKind::TaskRetrying {
                        task_id: Arc::clone(&task_id),
                        attempt,
                        error: err.to_string(),
                        delay_ms: delay.as_millis() as u64,
                    });
                },
            );

            let (result, attempts) = match AssertUnwindSafe(attempts).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    let err = EtlError::TaskPanicked {
                        task: task_id.to_string(),
                        reason,
                    };
                    (Err(err), 1)
                }
            };

            TaskOutcome {
                task_id,
                result,
                attempts,
                duration: start.elapsed(),
            }
        });
    }

    /// Mark every not-yet-started task downstream of `failed` as skipped
    fn skip_downstream(&self, failed: &Arc<str>, started: &mut HashSet<Arc<str>>) {
        for dependent in self.graph.transitive_dependents(failed) {
            if !started.insert(Arc::clone(&dependent)) {
                continue;
            }
            info!(task = %dependent, upstream = %failed, "Skipping task");
            if self.show_progress {
                println!(
                    "  {} {} {}",
                    "[⊘]".yellow(),
                    &dependent,
                    format!("skipped ({} failed)", failed).dimmed()
                );
            }
            self.states.set(
                Arc::clone(&dependent),
                TaskState::Skipped {
                    upstream: Arc::clone(failed),
                },
            );
            self.event_log.emit(EventKind::TaskSkipped {
                task_id: dependent,
                upstream: Arc::clone(failed),
            });
        }
    }

    fn record_outcome(&self, outcome: TaskOutcome, started: &mut HashSet<Arc<str>>) {
        let TaskOutcome {
            task_id,
            result,
            attempts,
            duration,
        } = outcome;

        match result {
            Ok(()) => {
                info!(task = %task_id, attempts, duration_ms = duration.as_millis() as u64, "Task succeeded");
                if self.show_progress {
                    println!(
                        "  {} {} {}",
                        "[✓]".green(),
                        &task_id,
                        format!("({:.1}s)", duration.as_secs_f32()).dimmed()
                    );
                }
                self.event_log.emit(EventKind::TaskSucceeded {
                    task_id: Arc::clone(&task_id),
                    attempts,
                    duration_ms: duration.as_millis() as u64,
                });
                self.states
                    .set(task_id, TaskState::Succeeded { attempts, duration });
            }
            Err(err) => {
                error!(task = %task_id, attempts, kind = %err.kind(), error = %err, "Task failed");
                if self.show_progress {
                    println!("  {} {}", "[✗]".red(), &task_id);
                    println!("      {} {}", "Error:".red(), err);
                }
                self.event_log.emit(EventKind::TaskFailed {
                    task_id: Arc::clone(&task_id),
                    error: err.to_string(),
                    error_kind: err.kind(),
                    attempts,
                });
                self.states.set(
                    Arc::clone(&task_id),
                    TaskState::Failed {
                        error: Arc::new(err),
                        attempts,
                    },
                );
                self.skip_downstream(&task_id, started);
            }
        }
    }

    /// Main execution loop
    #[instrument(skip(self, context), fields(pipeline = %self.graph.name(), run_id = %context.run_id()))]
    pub async fn run(&self, context: RunContext) -> RunReport {
        let run_start = Instant::now();
        let context = Arc::new(context);
        let limiter = self.max_active_tasks.map(|n| Arc::new(Semaphore::new(n)));

        for task in self.graph.iter() {
            self.states.set(Arc::clone(task.id()), TaskState::Pending);
        }

        info!(tasks = self.graph.len(), logical_date = %context.logical_date(), "Starting pipeline run");
        self.event_log.emit(EventKind::RunStarted {
            pipeline: self.graph.name().to_string(),
            run_id: context.run_id().to_string(),
            logical_date: context.logical_date().to_rfc3339(),
            task_count: self.graph.len(),
        });
        if self.show_progress {
            println!(
                "{} Running pipeline '{}' for {} ({} tasks)...\n",
                "→".cyan(),
                self.graph.name(),
                context.logical_date().format("%Y-%m-%d %H:%M"),
                self.graph.len()
            );
        }

        let mut started: HashSet<Arc<str>> = HashSet::with_capacity(self.graph.len());
        let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();

        loop {
            for task in self.ready_tasks(&started) {
                started.insert(Arc::clone(task.id()));
                self.event_log.emit(EventKind::TaskScheduled {
                    task_id: Arc::clone(task.id()),
                    dependencies: task.dependencies().to_vec(),
                });
                if self.show_progress {
                    println!("  {} {} {}", "[⟳]".yellow(), task.name(), "running...".dimmed());
                }
                self.spawn_task(&mut join_set, task, &context, limiter.clone());
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            match joined {
                Ok(outcome) => self.record_outcome(outcome, &mut started),
                Err(e) => error!(error = %e, "Task join failed"),
            }
        }

        // Only reachable after a join failure: nothing can report for these
        for task in self.graph.iter() {
            if !self.states.is_terminal(task.name()) && started.contains(task.name()) {
                self.record_outcome(
                    TaskOutcome {
                        task_id: Arc::clone(task.id()),
                        result: Err(EtlError::TaskPanicked {
                            task: task.name().to_string(),
                            reason: "task aborted".into(),
                        }),
                        attempts: 1,
                        duration: Duration::ZERO,
                    },
                    &mut started,
                );
            }
        }

        let report = RunReport {
            pipeline: self.graph.name().to_string(),
            run_id: context.run_id().to_string(),
            logical_date: context.logical_date(),
            tasks: self
                .graph
                .iter()
                .map(|t| TaskReport {
                    task_id: Arc::clone(t.id()),
                    kind: t.kind(),
                    state: self.states.state(t.name()),
                })
                .collect(),
            duration: run_start.elapsed(),
        };

        let total_duration_ms = report.duration.as_millis() as u64;
        if report.is_success() {
            info!(duration_ms = total_duration_ms, "Pipeline run succeeded");
            self.event_log
                .emit(EventKind::RunCompleted { total_duration_ms });
            if self.show_progress {
                println!("\n{} Done!\n", "✓".green());
            }
        } else {
            let failed_tasks = report
                .failed()
                .into_iter()
                .map(Arc::from)
                .collect::<Vec<Arc<str>>>();
            let skipped_tasks = report
                .skipped()
                .into_iter()
                .map(Arc::from)
                .collect::<Vec<Arc<str>>>();
            warn!(failed = ?failed_tasks, skipped = ?skipped_tasks, "Pipeline run failed");
            self.event_log.emit(EventKind::RunFailed {
                failed_tasks,
                skipped_tasks,
                total_duration_ms,
            });
        }

        report
    }
}
