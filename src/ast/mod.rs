//! AST Module - pipeline definitions parsed from YAML
//!
//! - `pipeline`: PipelineDef, TaskDef, DependsOn
//! - `action`: ActionDef and the per-kind parameter blocks
//!
//! These types are the raw "what" as written in the file. `PipelineDef::build`
//! validates them into a [`PipelineGraph`](crate::dag::PipelineGraph).

mod action;
mod pipeline;

pub use action::{ActionDef, CheckDef, LoadParams, QualityParams, StageParams};
pub use pipeline::{DependsOn, PipelineDef, TaskDef, SCHEMA_V01};
