//! Runtime Module - pipeline execution
//!
//! - `runner`: DAG execution with tokio concurrency
//! - `retry`: the uniform retry policy
//! - `output`: per-run report
//!
//! This module is the "how" - runtime execution.
//! For static structure, see the `ast` and `dag` modules.

mod output;
mod retry;
mod runner;

pub use output::{RunReport, TaskReport};
pub use retry::RetryPolicy;
pub use runner::Runner;
