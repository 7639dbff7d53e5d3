//! Pipeline Types - the YAML file structure
//!
//! ```yaml
//! schema: sparkify/pipeline@0.1
//! name: sparkify
//! schedule: "@hourly"
//! tasks:
//!   - id: stage_events
//!     stage: { ... }
//!   - id: load_songplays_fact_table
//!     depends_on: [stage_events, stage_songs]
//!     fact: { ... }
//! ```
//!
//! Tasks must be declared after everything they depend on.

use std::path::Path;

use serde::Deserialize;

use crate::dag::PipelineGraph;
use crate::error::{EtlError, Result};
use crate::task::{LoadTask, QualityCheck, QualityGate, StageTask, Task, TaskAction};

use super::action::{ActionDef, StageParams};

/// Expected schema version for v0.1 pipelines
pub const SCHEMA_V01: &str = "sparkify/pipeline@0.1";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineDef {
    pub schema: String,
    pub name: String,
    /// Informational; triggering belongs to the scheduler
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub tasks: Vec<TaskDef>,
}

/// Single or multiple upstream task ids
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DependsOn {
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            DependsOn::Single(s) => vec![s.as_str()],
            DependsOn::Multiple(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaskDef {
    pub id: String,
    #[serde(default)]
    pub depends_on: Option<DependsOn>,
    #[serde(flatten)]
    pub action: ActionDef,
}

impl TaskDef {
    pub fn dependencies(&self) -> Vec<&str> {
        self.depends_on
            .as_ref()
            .map(DependsOn::as_vec)
            .unwrap_or_default()
    }

    /// Validate into an executable task
    pub fn to_task(&self) -> Result<Task> {
        let action = match &self.action {
            ActionDef::Stage { stage } => TaskAction::Stage(self.stage_task(stage)?),
            ActionDef::Fact { fact } => TaskAction::FactLoad(
                LoadTask::new(&fact.table, &fact.query)?.with_append(fact.append),
            ),
            ActionDef::Dimension { dimension } => TaskAction::DimensionLoad(
                LoadTask::new(&dimension.table, &dimension.query)?.with_append(dimension.append),
            ),
            ActionDef::Quality { quality } => {
                let checks = quality
                    .checks
                    .iter()
                    .map(|c| QualityCheck::new(&c.sql, c.expected.clone()))
                    .collect::<Result<Vec<_>>>()?;
                TaskAction::QualityGate(QualityGate::new(checks).with_fail_fast(quality.fail_fast))
            }
        };
        Task::new(&self.id, self.dependencies(), action)
    }

    fn stage_task(&self, stage: &StageParams) -> Result<StageTask> {
        if stage.key.is_empty() {
            return Err(EtlError::MissingField {
                task: self.id.clone(),
                field: "stage.key".into(),
            });
        }
        Ok(
            StageTask::new(&stage.table, &stage.credentials, &stage.bucket, &stage.key)?
                .with_json_path(&stage.json_path)?
                .with_region(stage.region.clone()),
        )
    }
}

impl PipelineDef {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(yaml)?;
        def.validate_schema()?;
        Ok(def)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| EtlError::InvalidConfig {
            reason: format!("failed to read pipeline {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate_schema(&self) -> Result<()> {
        if self.schema != SCHEMA_V01 {
            return Err(EtlError::InvalidConfig {
                reason: format!(
                    "unsupported schema '{}', expected '{}'",
                    self.schema, SCHEMA_V01
                ),
            });
        }
        if self.name.trim().is_empty() {
            return Err(EtlError::MissingField {
                task: "<pipeline>".into(),
                field: "name".into(),
            });
        }
        Ok(())
    }

    /// Build the graph, validating every task in declaration order
    pub fn build(&self) -> Result<PipelineGraph> {
        let mut graph = PipelineGraph::new(&self.name);
        for def in &self.tasks {
            graph.add_task(def.to_task()?)?;
        }
        Ok(graph)
    }
}
