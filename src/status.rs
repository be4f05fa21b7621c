//! Status Reporter: current version, applied scripts and lock state.

use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Highest applied version, 0 on a fresh database.
    pub current_version: i64,
    /// Applied scripts, most recent first.
    pub entries: Vec<LedgerEntry>,
    pub locked: bool,
}

impl StatusReport {
    pub fn is_fresh(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read the ledger and lock state. Only the bookkeeping tables are
/// created when missing; nothing else is written.
pub async fn status(session: &mut Session) -> MigrateResult<StatusReport> {
    session.bootstrap().await?;
    let (conn, ledger, lock) = session.parts();
    let current_version = ledger.current_version(conn).await?;
    let entries = ledger.entries(conn).await?;
    let locked = lock.is_locked(conn).await?;
    Ok(StatusReport {
        current_version,
        entries,
        locked,
    })
}
