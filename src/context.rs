//! Run context - per-invocation parameters
//!
//! One [`RunContext`] per pipeline invocation: the logical timestamp, the
//! data interval it covers and a run id. Every task of the run reads the same
//! `Arc<RunContext>`; nothing mutates it. Backfills re-run the pipeline with a
//! different logical date.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{EtlError, Result};

/// Interval covered by one run when none is given (hourly schedule)
pub const DEFAULT_INTERVAL_HOURS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    run_id: String,
    logical_date: DateTime<Utc>,
    data_interval_start: DateTime<Utc>,
    data_interval_end: DateTime<Utc>,
}

impl RunContext {
    /// Context for a logical timestamp with a one-hour interval starting there
    pub fn new(logical_date: DateTime<Utc>) -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            logical_date,
            data_interval_start: logical_date,
            data_interval_end: logical_date + Duration::hours(DEFAULT_INTERVAL_HOURS),
        }
    }

    /// Context for midnight UTC of `date`
    pub fn for_date(date: NaiveDate) -> Self {
        Self::new(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Override the data interval (`start <= end`)
    pub fn with_interval(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(EtlError::InvalidConfig {
                reason: format!("data interval end {} is before start {}", end, start),
            });
        }
        self.data_interval_start = start;
        self.data_interval_end = end;
        Ok(self)
    }

    /// Parse `YYYY-MM-DD` or an RFC 3339 timestamp
    pub fn parse_logical_date(input: &str) -> Result<DateTime<Utc>> {
        let input = input.trim();
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
        DateTime::parse_from_rfc3339(input)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EtlError::InvalidConfig {
                reason: format!(
                    "invalid logical date '{}': expected YYYY-MM-DD or RFC 3339 ({})",
                    input, e
                ),
            })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    pub fn data_interval_start(&self) -> DateTime<Utc> {
        self.data_interval_start
    }

    pub fn data_interval_end(&self) -> DateTime<Utc> {
        self.data_interval_end
    }
}
