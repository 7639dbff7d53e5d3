//! DAG Module - pipeline task graph
//!
//! - `graph`: PipelineGraph, built task by task
//! - `validate`: task and table name rules
//!
//! A task can only depend on tasks already in the graph, so the graph is
//! acyclic by construction and insertion order is a topological order.

mod graph;
mod validate;

pub use graph::PipelineGraph;
pub use validate::{validate_table_name, validate_task_name};
