//! Error taxonomy for discovery, persistence and execution failures.
//!
//! A held lock is not an error: it surfaces as [`crate::executor::RunOutcome::LockHeld`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the migration engine.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The script directory could not be listed.
    #[error("cannot read migration directory {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A script file is absent or unreadable.
    #[error("cannot read script {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A script file could not be written.
    #[error("cannot write script {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Reading or writing the ledger or lock table failed.
    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A migration or rollback script failed against the database.
    #[error("script {script} failed and every change of this run was rolled back: {source}")]
    Execution {
        script: String,
        #[source]
        source: sqlx::Error,
    },

    /// No usable inverse script exists for an applied migration.
    #[error("no rollback available for {script}: {rollback} is missing or holds no statements")]
    MissingRollback { script: String, rollback: String },

    /// A rollback target outside `0..=current`.
    #[error("invalid rollback target {target}: expected a version between 0 and {current}")]
    InvalidTarget { target: i64, current: i64 },

    /// A script name without a `V<digits>` prefix.
    #[error("script name {0} carries no version (expected V<version>__<description>.sql)")]
    InvalidScriptName(String),

    /// Connecting to the database or managing the run transaction failed.
    #[error("database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// A run report could not be persisted.
    #[error("cannot write report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration is unreadable or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MigrateError {
    pub(crate) fn persistence(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| MigrateError::Persistence { operation, source }
    }
}

/// Result type for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;
