//! Task Module - the four task kinds and their execution contract
//!
//! - `stage`: object storage → staging table (`StageTask`)
//! - `load`: staging → fact / dimension table (`LoadTask`)
//! - `quality`: scalar assertions (`QualityGate`)
//!
//! Every kind goes through [`TaskAction::execute`]. Tasks never retry; the
//! runner owns the retry policy.

mod load;
mod quality;
mod stage;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::RunContext;
use crate::credentials::CredentialProvider;
use crate::dag::validate_task_name;
use crate::error::Result;
use crate::event_log::{EventKind, EventLog};
use crate::warehouse::{Row, WarehouseClient};

pub use load::LoadTask;
pub use quality::{QualityCheck, QualityGate};
pub use stage::StageTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Stage,
    FactLoad,
    DimensionLoad,
    QualityGate,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Stage => "stage",
            TaskKind::FactLoad => "fact",
            TaskKind::DimensionLoad => "dimension",
            TaskKind::QualityGate => "quality",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    Stage(StageTask),
    FactLoad(LoadTask),
    DimensionLoad(LoadTask),
    QualityGate(QualityGate),
}

impl TaskAction {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskAction::Stage(_) => TaskKind::Stage,
            TaskAction::FactLoad(_) => TaskKind::FactLoad,
            TaskAction::DimensionLoad(_) => TaskKind::DimensionLoad,
            TaskAction::QualityGate(_) => TaskKind::QualityGate,
        }
    }

    /// Table written by this action (none for the quality gate)
    pub fn target_table(&self) -> Option<&str> {
        match self {
            TaskAction::Stage(t) => Some(t.table()),
            TaskAction::FactLoad(t) | TaskAction::DimensionLoad(t) => Some(t.table()),
            TaskAction::QualityGate(_) => None,
        }
    }

    pub async fn execute(&self, env: &TaskEnv) -> Result<()> {
        match self {
            TaskAction::Stage(t) => t.execute(env).await,
            TaskAction::FactLoad(t) | TaskAction::DimensionLoad(t) => t.execute(env).await,
            TaskAction::QualityGate(t) => t.execute(env).await,
        }
    }
}

/// A named, immutable unit of work with its upstream dependencies
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    name: Arc<str>,
    dependencies: Vec<Arc<str>>,
    action: TaskAction,
}

impl Task {
    /// Validates the name; duplicate dependencies collapse to one
    pub fn new<I, S>(name: &str, dependencies: I, action: TaskAction) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        validate_task_name(name)?;

        let mut deps: Vec<Arc<str>> = Vec::new();
        for dep in dependencies {
            let dep = dep.as_ref();
            if !deps.iter().any(|d| &**d == dep) {
                deps.push(Arc::from(dep));
            }
        }

        Ok(Self {
            name: Arc::from(name),
            dependencies: deps,
            action,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &Arc<str> {
        &self.name
    }

    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.dependencies
    }

    pub fn kind(&self) -> TaskKind {
        self.action.kind()
    }

    pub fn action(&self) -> &TaskAction {
        &self.action
    }
}

/// Shared collaborators handed to a task attempt
#[derive(Clone)]
pub struct TaskEnv {
    pub task_id: Arc<str>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub context: Arc<RunContext>,
    pub events: EventLog,
}

impl TaskEnv {
    /// Execute a statement that carries no secrets
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.execute_redacted(sql, sql).await
    }

    /// Execute `sql`, logging `shown` in its place
    pub async fn execute_redacted(&self, sql: &str, shown: &str) -> Result<()> {
        self.record(shown);
        self.warehouse.execute(sql).await
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.record(sql);
        self.warehouse.query(sql).await
    }

    fn record(&self, shown: &str) {
        debug!(task = %self.task_id, warehouse = self.warehouse.name(), sql = %shown, "Issuing statement");
        self.events.emit(EventKind::StatementIssued {
            task_id: self.task_id.clone(),
            sql: shown.to_string(),
        });
    }
}

impl fmt::Debug for TaskEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEnv")
            .field("task_id", &self.task_id)
            .field("warehouse", &self.warehouse.name())
            .field("run_id", &self.context.run_id())
            .finish()
    }
}
