//! Stage task - object storage to staging table
//!
//! Clears the staging table, then bulk-copies every object under the rendered
//! key. Running it twice for the same run context leaves the same contents.

use chrono::Utc;
use tracing::info;

use crate::credentials::Credentials;
use crate::dag::validate_table_name;
use crate::error::{EtlError, Result};
use crate::template::KeyTemplate;
use crate::warehouse::quote_literal;

use super::TaskEnv;

const REDACTED: &str = "****";

#[derive(Debug, Clone, PartialEq)]
pub struct StageTask {
    table: String,
    credential_id: String,
    bucket: String,
    key: KeyTemplate,
    json_path: String,
    region: Option<String>,
}

impl StageTask {
    pub fn new(
        table: impl Into<String>,
        credential_id: impl Into<String>,
        bucket: impl Into<String>,
        key_pattern: &str,
    ) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        let bucket = bucket.into();
        let bucket = bucket.trim().trim_start_matches("s3://").trim_end_matches('/');
        if bucket.is_empty() {
            return Err(EtlError::InvalidConfig {
                reason: format!("stage into '{}' has an empty bucket", table),
            });
        }

        let credential_id = credential_id.into();
        if credential_id.trim().is_empty() {
            return Err(EtlError::InvalidConfig {
                reason: format!("stage into '{}' has an empty credential id", table),
            });
        }

        Ok(Self {
            table,
            credential_id,
            bucket: bucket.to_string(),
            key: KeyTemplate::parse(key_pattern)?,
            json_path: "auto".to_string(),
            region: None,
        })
    }

    /// `auto` or an `s3://` JSONPaths file
    pub fn with_json_path(mut self, json_path: impl Into<String>) -> Result<Self> {
        let json_path = json_path.into();
        if json_path.trim().is_empty() {
            return Err(EtlError::InvalidConfig {
                reason: format!("stage into '{}' has an empty json_path", self.table),
            });
        }
        self.json_path = json_path;
        Ok(self)
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    /// Full `s3://bucket/key` for a rendered key
    pub fn source_path(&self, rendered_key: &str) -> String {
        format!(
            "s3://{}/{}",
            self.bucket,
            rendered_key.trim_start_matches('/')
        )
    }

    /// COPY statement carrying the real credentials
    pub fn copy_sql(&self, rendered_key: &str, creds: &Credentials) -> String {
        self.render_copy(
            rendered_key,
            &creds.access_key,
            &creds.secret_key,
            creds.session_token.as_deref(),
        )
    }

    /// COPY statement safe to log
    pub fn redacted_copy_sql(&self, rendered_key: &str, creds: &Credentials) -> String {
        self.render_copy(
            rendered_key,
            REDACTED,
            REDACTED,
            creds.session_token.as_ref().map(|_| REDACTED),
        )
    }

    fn render_copy(
        &self,
        rendered_key: &str,
        access_key: &str,
        secret_key: &str,
        session_token: Option<&str>,
    ) -> String {
        let mut sql = format!(
            "COPY {}\nFROM {}\nACCESS_KEY_ID {}\nSECRET_ACCESS_KEY {}\n",
            self.table,
            quote_literal(&self.source_path(rendered_key)),
            quote_literal(access_key),
            quote_literal(secret_key),
        );
        if let Some(token) = session_token {
            sql.push_str(&format!("SESSION_TOKEN {}\n", quote_literal(token)));
        }
        if let Some(region) = &self.region {
            sql.push_str(&format!("REGION {}\n", quote_literal(region)));
        }
        sql.push_str(&format!(
            "FORMAT AS JSON {}\nTRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL;",
            quote_literal(&self.json_path)
        ));
        sql
    }

    pub(crate) async fn execute(&self, env: &TaskEnv) -> Result<()> {
        let creds = env.credentials.resolve(&self.credential_id).await?;
        if creds.is_expired_at(Utc::now()) {
            return Err(EtlError::AuthFailed {
                credential_id: self.credential_id.clone(),
                reason: format!("credentials expired at {}", creds.expires_at),
            });
        }

        let key = self.key.render(&env.context);
        info!(
            task = %env.task_id,
            table = %self.table,
            key_pattern = %self.key,
            source = %self.source_path(&key),
            "Copying data from object storage"
        );

        env.execute(&format!("DELETE FROM {}", self.table)).await?;

        env.execute_redacted(
            &self.copy_sql(&key, &creds),
            &self.redacted_copy_sql(&key, &creds),
        )
        .await
    }
}
