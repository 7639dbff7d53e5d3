//! Warehouse Module - SQL execution against the target store
//!
//! The pipeline only ever talks to the warehouse through [`WarehouseClient`]:
//! plain SQL text in, unit or rows out. Parameters are inlined by the caller.
//!
//! Implementations:
//! - [`PgWarehouse`]: Redshift/Postgres over the wire protocol (sqlx)
//! - [`InMemoryWarehouse`]: table-simulating double for tests and `--dry-run`

mod memory;
mod postgres;
mod scalar;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{InMemoryWarehouse, StatementRecord};
pub use postgres::{PgWarehouse, WarehouseConfig};
pub use scalar::{Row, Scalar};

/// Executes SQL statements against the warehouse
///
/// Both methods fail with a `Connection` kind error when the warehouse can't
/// be reached and a `Load` kind error when the statement itself is rejected.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Short name for logs ("postgres", "memory")
    fn name(&self) -> &str;

    /// Execute a statement, discarding any result rows
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Execute a query and return its rows in order
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Quote a SQL string literal (`'` doubled)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
