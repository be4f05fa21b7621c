//! Run reports: one record per script touched by a run.
//!
//! The engine hands records to a [`ReportWriter`]; [`JsonReportWriter`]
//! keeps an append-only JSON array per run kind on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, MigrateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
    Failed,
    RolledBack,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Success => write!(f, "SUCCESS"),
            RecordStatus::Failed => write!(f, "FAILED"),
            RecordStatus::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Outcome of one script within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub script_name: String,
    pub status: RecordStatus,
    #[serde(rename = "timestamp")]
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Record stamped with the current time.
    pub fn now(script_name: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            script_name: script_name.into(),
            status,
            applied_at: Utc::now(),
        }
    }
}

/// Which executor produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Migrate,
    Rollback,
}

impl RunKind {
    /// Report file relative to the report root.
    pub fn relative_path(self) -> PathBuf {
        match self {
            RunKind::Migrate => Path::new("migrate").join("migration_report.json"),
            RunKind::Rollback => Path::new("rollback").join("rollback_report.json"),
        }
    }
}

/// Destination for run records.
pub trait ReportWriter: Send + Sync {
    fn write(&self, kind: RunKind, records: &[MigrationRecord]) -> MigrateResult<()>;
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReportWriter;

impl ReportWriter for NoopReportWriter {
    fn write(&self, _kind: RunKind, _records: &[MigrationRecord]) -> MigrateResult<()> {
        Ok(())
    }
}

/// Appends records to `<root>/migrate/migration_report.json` and
/// `<root>/rollback/rollback_report.json`.
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    root: PathBuf,
}

impl JsonReportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, kind: RunKind) -> PathBuf {
        self.root.join(kind.relative_path())
    }

    /// Every record stored for `kind`, oldest first.
    pub fn read_all(&self, kind: RunKind) -> MigrateResult<Vec<MigrationRecord>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| MigrateError::Report {
            path: path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| MigrateError::Report {
            path,
            source: e.into(),
        })
    }
}

impl ReportWriter for JsonReportWriter {
    fn write(&self, kind: RunKind, records: &[MigrationRecord]) -> MigrateResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.path(kind);
        let report_err = |source: std::io::Error| MigrateError::Report {
            path: path.clone(),
            source,
        };

        let mut all = self.read_all(kind)?;
        all.extend_from_slice(records);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(report_err)?;
        }
        let json = serde_json::to_string_pretty(&all).map_err(|e| report_err(e.into()))?;
        fs::write(&path, json).map_err(report_err)?;

        tracing::info!(path = %path.display(), records = records.len(), "report updated");
        Ok(())
    }
}
