//! Reverse runs: execute stored rollback scripts, newest first.

use std::io::ErrorKind;

use sqlx::{AnyConnection, Connection};

use super::{RunOutcome, finish, release_after};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::HistoryLedger;
use crate::report::{MigrationRecord, RecordStatus, ReportWriter, RunKind};
use crate::script::{ScriptStore, rollback_name};
use crate::session::Session;
use crate::synth::lexer::has_statements;

/// Reverts applied scripts using their `_rollback.sql` companions.
pub struct RollbackExecutor<'a> {
    store: &'a ScriptStore,
    reports: &'a dyn ReportWriter,
}

impl<'a> RollbackExecutor<'a> {
    pub fn new(store: &'a ScriptStore, reports: &'a dyn ReportWriter) -> Self {
        Self { store, reports }
    }

    /// Revert the most recently applied script.
    pub async fn rollback_last(&self, session: &mut Session) -> MigrateResult<RunOutcome> {
        self.run(session, None).await
    }

    /// Revert every script with a version above `target`, highest first,
    /// in one transaction. `target` must lie in `0..=current`.
    pub async fn rollback_to(
        &self,
        session: &mut Session,
        target: i64,
    ) -> MigrateResult<RunOutcome> {
        self.run(session, Some(target)).await
    }

    async fn run(&self, session: &mut Session, target: Option<i64>) -> MigrateResult<RunOutcome> {
        session.bootstrap().await?;

        let (conn, ledger, lock) = session.parts();
        if !lock.acquire(conn).await? {
            return Ok(RunOutcome::LockHeld);
        }

        let mut records = Vec::new();
        let result = self.revert(conn, ledger, target, &mut records).await;
        let result = release_after(conn, lock, result).await;
        finish(self.reports, RunKind::Rollback, records, result)
    }

    async fn revert(
        &self,
        conn: &mut AnyConnection,
        ledger: &HistoryLedger,
        target: Option<i64>,
        records: &mut Vec<MigrationRecord>,
    ) -> MigrateResult<()> {
        let names = match target {
            None => {
                let mut names = ledger.applied_names(conn).await?;
                names.truncate(1);
                names
            }
            Some(target) => {
                let current = ledger.current_version(conn).await?;
                if !(0..=current).contains(&target) {
                    return Err(MigrateError::InvalidTarget { target, current });
                }
                ledger.names_above(conn, target).await?
            }
        };
        if names.is_empty() {
            tracing::info!("nothing to roll back");
            return Ok(());
        }

        // Every inverse is loaded before the transaction opens, so a missing
        // file aborts the run before any statement executes.
        let mut inverses = Vec::with_capacity(names.len());
        for name in &names {
            inverses.push((name.as_str(), self.load_inverse(name)?));
        }

        let mut tx = conn.begin().await.map_err(MigrateError::Connection)?;
        for (name, body) in &inverses {
            tracing::info!(script = %name, "rolling back");
            if let Err(source) = sqlx::raw_sql(body).execute(&mut *tx).await {
                records.push(MigrationRecord::now(*name, RecordStatus::Failed));
                tracing::error!(script = %name, error = %source, "rollback failed, nothing was reverted");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "transaction rollback failed");
                }
                return Err(MigrateError::Execution {
                    script: rollback_name(name),
                    source,
                });
            }
            ledger.remove(&mut tx, name).await?;
            records.push(MigrationRecord::now(*name, RecordStatus::RolledBack));
        }
        tx.commit().await.map_err(MigrateError::Connection)?;

        tracing::info!(reverted = records.len(), "rollback run committed");
        Ok(())
    }

    fn load_inverse(&self, script_name: &str) -> MigrateResult<String> {
        let missing = || MigrateError::MissingRollback {
            script: script_name.to_string(),
            rollback: rollback_name(script_name),
        };
        let body = match self.store.read_rollback(script_name) {
            Ok(body) => body,
            Err(MigrateError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Err(missing());
            }
            Err(err) => return Err(err),
        };
        if !has_statements(&body) {
            return Err(missing());
        }
        Ok(body)
    }
}
