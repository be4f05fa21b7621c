//! History Ledger: the table of currently applied scripts.
//!
//! Rows are deleted on rollback, so the table answers "what is applied
//! now"; the run reports keep the history.

use chrono::NaiveDateTime;
use sqlx::{AnyConnection, Row};

use crate::error::{MigrateError, MigrateResult};
use crate::script::parse_version;
use crate::session::parse_db_timestamp;

/// One applied script as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub version: i64,
    pub script_name: String,
    pub applied_at: Option<NaiveDateTime>,
}

/// Accessor for the ledger table.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    table: String,
}

impl HistoryLedger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version BIGINT NOT NULL,\n    \
                script_name VARCHAR(255) NOT NULL PRIMARY KEY,\n    \
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    /// Create the table if absent.
    pub async fn ensure_table(&self, conn: &mut AnyConnection) -> MigrateResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("creating ledger table"))?;
        Ok(())
    }

    /// Highest applied version, 0 when nothing is applied.
    pub async fn current_version(&self, conn: &mut AnyConnection) -> MigrateResult<i64> {
        let sql = format!("SELECT COALESCE(MAX(version), 0) FROM {}", self.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut *conn)
            .await
            .map_err(MigrateError::persistence("reading current version"))
    }

    /// Applied script names, most recent (highest version) first.
    pub async fn applied_names(&self, conn: &mut AnyConnection) -> MigrateResult<Vec<String>> {
        let sql = format!(
            "SELECT script_name FROM {} ORDER BY version DESC, script_name DESC",
            self.table
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(MigrateError::persistence("reading applied scripts"))
    }

    /// Full ledger rows, most recent first.
    pub async fn entries(&self, conn: &mut AnyConnection) -> MigrateResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT version, script_name, CAST(applied_at AS TEXT) AS applied_at \
             FROM {} ORDER BY version DESC, script_name DESC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(MigrateError::persistence("reading ledger"))?;

        rows.iter()
            .map(|row| -> Result<LedgerEntry, sqlx::Error> {
                let applied_at: Option<String> = row.try_get("applied_at")?;
                Ok(LedgerEntry {
                    version: row.try_get("version")?,
                    script_name: row.try_get("script_name")?,
                    applied_at: applied_at.as_deref().and_then(parse_db_timestamp),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(MigrateError::persistence("decoding ledger"))
    }

    /// Insert a row for `script_name` with its parsed version.
    pub async fn record(&self, conn: &mut AnyConnection, script_name: &str) -> MigrateResult<()> {
        let version = parse_version(script_name)
            .ok_or_else(|| MigrateError::InvalidScriptName(script_name.to_string()))?;
        let sql = format!(
            "INSERT INTO {} (version, script_name) VALUES ($1, $2)",
            self.table
        );
        sqlx::query(&sql)
            .bind(version)
            .bind(script_name)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("recording migration"))?;
        tracing::debug!(script = %script_name, version, "recorded in ledger");
        Ok(())
    }

    /// Delete the row for `script_name`; absent rows are fine.
    pub async fn remove(&self, conn: &mut AnyConnection, script_name: &str) -> MigrateResult<()> {
        let sql = format!("DELETE FROM {} WHERE script_name = $1", self.table);
        sqlx::query(&sql)
            .bind(script_name)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("removing migration record"))?;
        tracing::debug!(script = %script_name, "removed from ledger");
        Ok(())
    }

    /// Names with version strictly above `target`, highest first.
    pub async fn names_above(
        &self,
        conn: &mut AnyConnection,
        target: i64,
    ) -> MigrateResult<Vec<String>> {
        let sql = format!(
            "SELECT script_name FROM {} WHERE version > $1 ORDER BY version DESC, script_name DESC",
            self.table
        );
        sqlx::query_scalar::<_, String>(&sql)
            .bind(target)
            .fetch_all(&mut *conn)
            .await
            .map_err(MigrateError::persistence("reading scripts to roll back"))
    }
}
