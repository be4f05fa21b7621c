//! A database session: one connection plus the ledger and lock accessors.

use chrono::NaiveDateTime;
use sqlx::{AnyConnection, Connection};

use crate::config::TableNames;
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::HistoryLedger;
use crate::lock::LockCoordinator;

/// Owns the connection a run executes on.
pub struct Session {
    conn: AnyConnection,
    ledger: HistoryLedger,
    lock: LockCoordinator,
}

impl Session {
    /// Connect to `url`. `postgres://` and `sqlite:` URLs are supported.
    pub async fn connect(url: &str, tables: &TableNames) -> MigrateResult<Self> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(url)
            .await
            .map_err(MigrateError::Connection)?;
        tracing::debug!(backend = conn.backend_name(), "connected");
        Ok(Self::new(conn, tables))
    }

    pub fn new(conn: AnyConnection, tables: &TableNames) -> Self {
        Self {
            conn,
            ledger: HistoryLedger::new(&tables.history),
            lock: LockCoordinator::new(&tables.lock),
        }
    }

    /// Create the ledger and lock tables if absent.
    pub async fn bootstrap(&mut self) -> MigrateResult<()> {
        self.ledger.ensure_table(&mut self.conn).await?;
        self.lock.ensure_table(&mut self.conn).await?;
        Ok(())
    }

    pub fn connection(&mut self) -> &mut AnyConnection {
        &mut self.conn
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    /// Split borrow for code that drives a transaction on the connection
    /// while calling the accessors.
    pub fn parts(&mut self) -> (&mut AnyConnection, &HistoryLedger, &LockCoordinator) {
        (&mut self.conn, &self.ledger, &self.lock)
    }

    pub async fn close(self) -> MigrateResult<()> {
        self.conn.close().await.map_err(MigrateError::Connection)
    }
}

/// Parse a timestamp rendered as text by the database.
pub(crate) fn parse_db_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
