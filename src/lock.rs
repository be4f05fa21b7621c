//! Lock Coordinator: one shared row that serialises runs across processes.
//!
//! Acquisition is a single conditional update, so two processes racing for
//! the row cannot both win. Lock writes run outside the run transaction and
//! commit immediately, which is what makes them visible to other processes.
//! A crashed run leaves the row locked until [`LockCoordinator::force_release`].

use chrono::NaiveDateTime;
use sqlx::{AnyConnection, Row};

use crate::error::{MigrateError, MigrateResult};
use crate::session::parse_db_timestamp;

const LOCK_ID: i64 = 1;

/// Snapshot of the lock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockState {
    pub locked: bool,
    pub locked_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct LockCoordinator {
    table: String,
}

impl LockCoordinator {
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
                id INTEGER PRIMARY KEY,\n    \
                locked BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                locked_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    pub async fn ensure_table(&self, conn: &mut AnyConnection) -> MigrateResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("creating lock table"))?;
        Ok(())
    }

    /// Current lock row, `None` if it was never created.
    pub async fn state(&self, conn: &mut AnyConnection) -> MigrateResult<Option<LockState>> {
        let sql = format!(
            "SELECT CASE WHEN locked THEN 1 ELSE 0 END AS locked, \
             CAST(locked_at AS TEXT) AS locked_at FROM {} WHERE id = $1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(LOCK_ID)
            .fetch_optional(&mut *conn)
            .await
            .map_err(MigrateError::persistence("reading lock state"))?;

        row.map(|row| -> Result<LockState, sqlx::Error> {
            // Drivers disagree on boolean decoding, so the flag comes back as an integer.
            let locked: i64 = row.try_get("locked")?;
            let locked_at: Option<String> = row.try_get("locked_at")?;
            Ok(LockState {
                locked: locked != 0,
                locked_at: locked_at.as_deref().and_then(parse_db_timestamp),
            })
        })
        .transpose()
        .map_err(MigrateError::persistence("decoding lock state"))
    }

    /// A missing row counts as unlocked.
    pub async fn is_locked(&self, conn: &mut AnyConnection) -> MigrateResult<bool> {
        Ok(self.state(conn).await?.is_some_and(|s| s.locked))
    }

    /// Take the lock. Returns `false` if another run holds it.
    pub async fn acquire(&self, conn: &mut AnyConnection) -> MigrateResult<bool> {
        let seed = format!(
            "INSERT INTO {} (id, locked) VALUES ($1, FALSE) ON CONFLICT (id) DO NOTHING",
            self.table
        );
        sqlx::query(&seed)
            .bind(LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("creating lock row"))?;

        let take = format!(
            "UPDATE {} SET locked = TRUE, locked_at = CURRENT_TIMESTAMP \
             WHERE id = $1 AND locked = FALSE",
            self.table
        );
        let result = sqlx::query(&take)
            .bind(LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("acquiring lock"))?;

        let acquired = result.rows_affected() == 1;
        if acquired {
            tracing::info!(table = %self.table, "migration lock acquired");
        } else {
            tracing::warn!(table = %self.table, "migration lock is held by another process");
        }
        Ok(acquired)
    }

    /// Clear the lock. Called on every exit path of a run that acquired it.
    pub async fn release(&self, conn: &mut AnyConnection) -> MigrateResult<()> {
        let sql = format!(
            "UPDATE {} SET locked = FALSE, locked_at = CURRENT_TIMESTAMP WHERE id = $1",
            self.table
        );
        sqlx::query(&sql)
            .bind(LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(MigrateError::persistence("releasing lock"))?;
        tracing::info!(table = %self.table, "migration lock released");
        Ok(())
    }

    /// Manual unlock after a crashed run. Returns whether the row was locked.
    pub async fn force_release(&self, conn: &mut AnyConnection) -> MigrateResult<bool> {
        let was_locked = self.is_locked(conn).await?;
        if was_locked {
            tracing::warn!(table = %self.table, "forcing release of migration lock");
            self.release(conn).await?;
        }
        Ok(was_locked)
    }
}
