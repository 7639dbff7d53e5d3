//! Name validation for tasks and tables
//!
//! Table names are inlined into SQL, so only plain (optionally quoted)
//! identifiers are accepted.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EtlError, Result};

static TASK_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:[A-Za-z_][A-Za-z0-9_]*|"[A-Za-z_][A-Za-z0-9_]*")(?:\.(?:[A-Za-z_][A-Za-z0-9_]*|"[A-Za-z_][A-Za-z0-9_]*"))?$"#)
        .unwrap()
});

pub fn validate_task_name(name: &str) -> Result<()> {
    if TASK_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::InvalidTaskName {
            name: name.to_string(),
        })
    }
}

/// `[schema.]table`, each segment optionally double-quoted
pub fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::InvalidTableName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names() {
        for ok in ["stage_events", "load_user_dim_table", "a", "q2"] {
            assert!(validate_task_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "Stage", "2stage", "stage-events", "stage events", "_x"] {
            assert!(validate_task_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn table_names() {
        for ok in ["songplays", "public.songplays", r#"public."time""#, "_tmp.x1"] {
            assert!(validate_table_name(ok).is_ok(), "{ok}");
        }
        for bad in [
            "",
            "public.",
            "a.b.c",
            "users; DROP TABLE users",
            r#""time"#,
            "1table",
        ] {
            assert!(validate_table_name(bad).is_err(), "{bad}");
        }
    }
}
