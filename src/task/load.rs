//! Fact and dimension loads
//!
//! Replace mode (default) deletes the target before inserting, so a re-run
//! converges to the same contents. Append mode only inserts.

use tracing::info;

use crate::dag::validate_table_name;
use crate::error::{EtlError, Result};

use super::TaskEnv;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTask {
    table: String,
    query: String,
    append: bool,
}

impl LoadTask {
    pub fn new(table: impl Into<String>, query: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        let query = query.into();
        if query.trim().is_empty() {
            return Err(EtlError::InvalidConfig {
                reason: format!("transform query for '{}' is empty", table),
            });
        }

        Ok(Self {
            table,
            query,
            append: false,
        })
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_append(&self) -> bool {
        self.append
    }

    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {}\n{}", self.table, self.query.trim())
    }

    pub(crate) async fn execute(&self, env: &TaskEnv) -> Result<()> {
        if !self.append {
            info!(task = %env.task_id, table = %self.table, "Clearing target table");
            env.execute(&format!("DELETE FROM {}", self.table)).await?;
        }

        info!(task = %env.task_id, table = %self.table, append = self.append, "Loading table");
        env.execute(&self.insert_sql()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_wraps_the_query() {
        let task = LoadTask::new("public.users", "\n  SELECT distinct userid FROM staging_events\n").unwrap();
        assert_eq!(
            task.insert_sql(),
            "INSERT INTO public.users\nSELECT distinct userid FROM staging_events"
        );
        assert!(!task.is_append());
    }

    #[test]
    fn empty_query_rejected() {
        let err = LoadTask::new("public.users", "   ").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
