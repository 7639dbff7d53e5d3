//! Sparkify ETL - batch pipeline from object storage into a warehouse star schema
//!
//! ## Module Structure
//!
//! - `ast`: pipeline YAML types (PipelineDef, TaskDef, ActionDef)
//! - `dag`: PipelineGraph and name validation
//! - `task`: the four task kinds and their execution contract
//! - `runtime`: Runner, RetryPolicy, RunReport
//! - `store`: per-run task states (DashMap)
//! - `warehouse`: WarehouseClient, PgWarehouse, InMemoryWarehouse
//! - `credentials`: CredentialProvider, StaticCredentialProvider
//! - `context`: RunContext (logical date, data interval, run id)
//! - `template`: storage key patterns
//! - `config`: `sparkify.toml` + environment overrides
//! - `event_log`: run audit trail
//! - `error`: EtlError with codes and fix suggestions

pub mod ast;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dag;
pub mod error;
pub mod event_log;
pub mod runtime;
pub mod store;
pub mod task;
pub mod template;
pub mod warehouse;

pub use ast::PipelineDef;
pub use config::EtlConfig;
pub use context::RunContext;
pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use dag::PipelineGraph;
pub use error::{ErrorKind, EtlError, FixSuggestion, Result};
pub use event_log::{Event, EventKind, EventLog};
pub use runtime::{RetryPolicy, RunReport, Runner};
pub use store::{StateStore, TaskState};
pub use task::{LoadTask, QualityCheck, QualityGate, StageTask, Task, TaskAction, TaskKind};
pub use warehouse::{InMemoryWarehouse, PgWarehouse, Row, Scalar, WarehouseClient};
