//! Lock-protected, transactional migrate and rollback runs.

mod migrate;
mod rollback;

pub use migrate::MigrationExecutor;
pub use rollback::RollbackExecutor;

use sqlx::AnyConnection;

use crate::error::MigrateResult;
use crate::lock::LockCoordinator;
use crate::report::{MigrationRecord, ReportWriter, RunKind};
use crate::script::{MigrationScript, ScriptStore};
use crate::synth;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Scripts were applied or reverted; one record per script.
    Completed(Vec<MigrationRecord>),
    /// Nothing pending, or nothing above the rollback target.
    NothingToDo,
    /// Another process holds the lock. No statement was executed.
    LockHeld,
}

impl RunOutcome {
    pub fn records(&self) -> &[MigrationRecord] {
        match self {
            RunOutcome::Completed(records) => records,
            _ => &[],
        }
    }
}

/// Release the lock and merge the release result into the run result.
/// A run error wins over a release error.
pub(crate) async fn release_after<T>(
    conn: &mut AnyConnection,
    lock: &LockCoordinator,
    result: MigrateResult<T>,
) -> MigrateResult<T> {
    let released = lock.release(conn).await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::error!(error = %release_err, "failed to release migration lock");
            Err(err)
        }
    }
}

/// Hand the records to the report writer and build the outcome.
///
/// Failed runs are reported too; a report error there is logged so that
/// the run's own error reaches the caller.
pub(crate) fn finish(
    reports: &dyn ReportWriter,
    kind: RunKind,
    records: Vec<MigrationRecord>,
    result: MigrateResult<()>,
) -> MigrateResult<RunOutcome> {
    match result {
        Ok(()) if records.is_empty() => Ok(RunOutcome::NothingToDo),
        Ok(()) => {
            reports.write(kind, &records)?;
            Ok(RunOutcome::Completed(records))
        }
        Err(err) => {
            if !records.is_empty()
                && let Err(report_err) = reports.write(kind, &records)
            {
                tracing::error!(error = %report_err, "failed to write run report");
            }
            Err(err)
        }
    }
}

/// Write a synthesized rollback file for every script that lacks one.
/// Existing files, including hand-edited ones, are left alone.
pub(crate) fn materialize_rollbacks(
    store: &ScriptStore,
    scripts: &[MigrationScript],
) -> MigrateResult<usize> {
    let mut written = 0;
    for script in scripts {
        let synthesis = synth::synthesize_detailed(&script.body);
        if store.write_rollback(&script.name, &synthesis.render(&script.name))? {
            written += 1;
            if synthesis.is_empty() {
                tracing::warn!(script = %script.name, "no automatic rollback; wrote a placeholder");
            } else {
                tracing::info!(script = %script.name, "generated rollback script");
            }
            for warning in synthesis.warnings() {
                tracing::warn!(script = %script.name, "{}", warning);
            }
        }
    }
    Ok(written)
}
