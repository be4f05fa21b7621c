//! # schemashift
//!
//! Versioned SQL migrations with a history ledger, a cross-process run lock
//! and heuristic rollback script synthesis.
//!
//! ```ignore
//! use schemashift::prelude::*;
//!
//! let config = Config::load(None)?;
//! let store = ScriptStore::new(&config.paths.migrations, config.paths.rollbacks_dir());
//! let reports = JsonReportWriter::new(&config.paths.reports);
//! let mut session = Session::connect(config.database_url()?, &config.tables).await?;
//!
//! match MigrationExecutor::new(&store, &reports).migrate(&mut session).await? {
//!     RunOutcome::Completed(records) => println!("applied {}", records.len()),
//!     RunOutcome::NothingToDo => println!("up to date"),
//!     RunOutcome::LockHeld => println!("another run is in progress"),
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod lock;
pub mod report;
pub mod script;
pub mod session;
pub mod status;
pub mod synth;

pub use config::Config;
pub use error::{MigrateError, MigrateResult};
pub use executor::{MigrationExecutor, RollbackExecutor, RunOutcome};
pub use session::Session;
pub use synth::synthesize;

/// Common imports.
pub mod prelude {
    pub use crate::config::{Config, TableNames};
    pub use crate::error::{MigrateError, MigrateResult};
    pub use crate::executor::{MigrationExecutor, RollbackExecutor, RunOutcome};
    pub use crate::ledger::{HistoryLedger, LedgerEntry};
    pub use crate::lock::{LockCoordinator, LockState};
    pub use crate::report::{
        JsonReportWriter, MigrationRecord, NoopReportWriter, RecordStatus, ReportWriter, RunKind,
    };
    pub use crate::script::{MigrationScript, ScriptStore};
    pub use crate::session::Session;
    pub use crate::status::{StatusReport, status};
    pub use crate::synth::{Synthesis, synthesize, synthesize_detailed};
}
