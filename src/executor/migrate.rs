//! Forward runs: apply every pending script in one transaction.

use sqlx::{AnyConnection, Connection};

use super::{RunOutcome, finish, materialize_rollbacks, release_after};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::HistoryLedger;
use crate::report::{MigrationRecord, RecordStatus, ReportWriter, RunKind};
use crate::script::{MigrationScript, ScriptStore};
use crate::session::Session;

/// Applies pending scripts.
pub struct MigrationExecutor<'a> {
    store: &'a ScriptStore,
    reports: &'a dyn ReportWriter,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(store: &'a ScriptStore, reports: &'a dyn ReportWriter) -> Self {
        Self { store, reports }
    }

    /// Scripts on disk that the ledger does not list, in apply order.
    /// Executes nothing.
    pub async fn plan(&self, session: &mut Session) -> MigrateResult<Vec<MigrationScript>> {
        session.bootstrap().await?;
        let scripts = self.store.list_pending()?;
        let (conn, ledger, _) = session.parts();
        let applied = ledger.applied_names(conn).await?;
        Ok(scripts
            .into_iter()
            .filter(|s| !applied.contains(&s.name))
            .collect())
    }

    /// Apply every pending script.
    ///
    /// All scripts of the run share one transaction: the first failure
    /// rolls back everything applied by this run and is returned as
    /// [`MigrateError::Execution`]. Missing rollback files are written
    /// before the commit.
    pub async fn migrate(&self, session: &mut Session) -> MigrateResult<RunOutcome> {
        session.bootstrap().await?;
        let scripts = self.store.list_pending()?;

        let (conn, ledger, lock) = session.parts();
        if !lock.acquire(conn).await? {
            return Ok(RunOutcome::LockHeld);
        }

        let mut records = Vec::new();
        let result = self.apply(conn, ledger, &scripts, &mut records).await;
        let result = release_after(conn, lock, result).await;
        finish(self.reports, RunKind::Migrate, records, result)
    }

    async fn apply(
        &self,
        conn: &mut AnyConnection,
        ledger: &HistoryLedger,
        scripts: &[MigrationScript],
        records: &mut Vec<MigrationRecord>,
    ) -> MigrateResult<()> {
        let mut tx = conn.begin().await.map_err(MigrateError::Connection)?;
        let applied = ledger.applied_names(&mut tx).await?;

        for script in scripts {
            if applied.contains(&script.name) {
                tracing::debug!(script = %script.name, "already applied");
                continue;
            }

            tracing::info!(script = %script.name, version = script.version, "applying");
            if let Err(source) = sqlx::raw_sql(&script.body).execute(&mut *tx).await {
                records.push(MigrationRecord::now(&script.name, RecordStatus::Failed));
                tracing::error!(
                    script = %script.name,
                    error = %source,
                    "migration failed, rolling back this run"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "transaction rollback failed");
                }
                return Err(MigrateError::Execution {
                    script: script.name.clone(),
                    source,
                });
            }

            ledger.record(&mut tx, &script.name).await?;
            records.push(MigrationRecord::now(&script.name, RecordStatus::Success));
        }

        materialize_rollbacks(self.store, scripts)?;

        tx.commit().await.map_err(MigrateError::Connection)?;
        if !records.is_empty() {
            tracing::info!(applied = records.len(), "migration run committed");
        }
        Ok(())
    }
}
