//! Integration tests for the migration engine against an in-memory SQLite
//! database.
//!
//! Each test gets its own connection (and therefore its own database) and a
//! temporary script directory.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use pretty_assertions::assert_eq;
use schemashift::prelude::*;
use tempfile::TempDir;

/// Keeps every report handed over by a run.
#[derive(Default)]
struct CollectingReports {
    runs: Mutex<Vec<(RunKind, Vec<MigrationRecord>)>>,
}

impl CollectingReports {
    fn runs(&self) -> Vec<(RunKind, Vec<MigrationRecord>)> {
        self.runs.lock().unwrap().clone()
    }
}

impl ReportWriter for CollectingReports {
    fn write(&self, kind: RunKind, records: &[MigrationRecord]) -> MigrateResult<()> {
        self.runs.lock().unwrap().push((kind, records.to_vec()));
        Ok(())
    }
}

async fn connect() -> Session {
    Session::connect("sqlite::memory:", &TableNames::default())
        .await
        .unwrap()
}

fn script_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in files {
        fs::write(dir.path().join(name), body).unwrap();
    }
    dir
}

fn names(records: &[MigrationRecord]) -> Vec<&str> {
    records.iter().map(|r| r.script_name.as_str()).collect()
}

async fn table_exists(session: &mut Session, table: &str) -> bool {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1")
            .bind(table)
            .fetch_one(session.connection())
            .await
            .unwrap();
    count == 1
}

async fn row_count(session: &mut Session, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(session.connection())
        .await
        .unwrap()
}

async fn applied(session: &mut Session) -> Vec<String> {
    let (conn, ledger, _) = session.parts();
    ledger.applied_names(conn).await.unwrap()
}

async fn current_version(session: &mut Session) -> i64 {
    let (conn, ledger, _) = session.parts();
    ledger.current_version(conn).await.unwrap()
}

async fn is_locked(session: &mut Session) -> bool {
    let (conn, _, lock) = session.parts();
    lock.is_locked(conn).await.unwrap()
}

/// `items` table plus one row per later script. The table's rollback is
/// written by hand; the inserts get generated DELETE rollbacks.
fn items_project() -> TempDir {
    script_dir(&[
        ("V1__create_items.sql", "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);"),
        ("V1__create_items_rollback.sql", "DROP TABLE items;\n"),
        ("V2__first_item.sql", "INSERT INTO items (id, name) VALUES (1, 'one');"),
        ("V3__second_item.sql", "INSERT INTO items (id, name) VALUES (2, 'two');"),
        ("V4__third_item.sql", "INSERT INTO items (id, name) VALUES (3, 'three');"),
    ])
}

// ============================================================================
// Migrate
// ============================================================================

#[tokio::test]
async fn test_migrate_applies_in_numeric_order() {
    let dir = script_dir(&[
        ("V10__ten.sql", "INSERT INTO log (step) VALUES (10);"),
        ("V2__two.sql", "INSERT INTO log (step) VALUES (2);"),
        ("V1__log.sql", "CREATE TABLE log (step INTEGER NOT NULL);"),
    ]);
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let mut session = connect().await;

    let outcome = MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap();

    assert_eq!(
        names(outcome.records()),
        vec!["V1__log.sql", "V2__two.sql", "V10__ten.sql"]
    );
    assert!(outcome.records().iter().all(|r| r.status == RecordStatus::Success));
    assert_eq!(current_version(&mut session).await, 10);
    assert_eq!(row_count(&mut session, "log").await, 2);
    assert!(!is_locked(&mut session).await);

    let runs = reports.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, RunKind::Migrate);
}

#[tokio::test]
async fn test_migrate_never_reapplies() {
    let dir = script_dir(&[
        ("V1__log.sql", "CREATE TABLE log (step INTEGER NOT NULL);"),
        ("V2__two.sql", "INSERT INTO log (step) VALUES (2);"),
    ]);
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let executor = MigrationExecutor::new(&store, &reports);
    let mut session = connect().await;

    executor.migrate(&mut session).await.unwrap();
    let second = executor.migrate(&mut session).await.unwrap();
    assert_eq!(second, RunOutcome::NothingToDo);
    assert_eq!(row_count(&mut session, "log").await, 1);

    fs::write(dir.path().join("V3__three.sql"), "INSERT INTO log (step) VALUES (3);").unwrap();
    let third = executor.migrate(&mut session).await.unwrap();
    assert_eq!(names(third.records()), vec!["V3__three.sql"]);
    assert_eq!(row_count(&mut session, "log").await, 2);
    assert_eq!(
        applied(&mut session).await,
        vec!["V3__three.sql", "V2__two.sql", "V1__log.sql"]
    );

    // Only runs that did something are reported.
    assert_eq!(reports.runs().len(), 2);
}

#[tokio::test]
async fn test_failed_script_rolls_back_whole_run() {
    let dir = script_dir(&[
        ("V1__create.sql", "CREATE TABLE accounts (id INTEGER PRIMARY KEY);"),
        ("V2__seed.sql", "INSERT INTO accounts (id) VALUES (1);"),
        ("V3__broken.sql", "INSERT INTO no_such_table (id) VALUES (1);"),
    ]);
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let mut session = connect().await;

    let err = MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap_err();

    match err {
        MigrateError::Execution { ref script, .. } => assert_eq!(script, "V3__broken.sql"),
        other => panic!("expected execution error, got {:?}", other),
    }
    assert!(!table_exists(&mut session, "accounts").await);
    assert!(applied(&mut session).await.is_empty());
    assert!(!is_locked(&mut session).await);

    // No rollback files for a run that never committed.
    assert!(!dir.path().join("V1__create_rollback.sql").exists());

    let runs = reports.runs();
    assert_eq!(runs.len(), 1);
    let statuses: Vec<RecordStatus> = runs[0].1.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![RecordStatus::Success, RecordStatus::Success, RecordStatus::Failed]
    );
}

#[tokio::test]
async fn test_held_lock_blocks_migrate() {
    let dir = script_dir(&[("V1__create.sql", "CREATE TABLE accounts (id INTEGER PRIMARY KEY);")]);
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let mut session = connect().await;

    session.bootstrap().await.unwrap();
    {
        let (conn, _, lock) = session.parts();
        assert!(lock.acquire(conn).await.unwrap());
    }

    let outcome = MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::LockHeld);
    assert!(!table_exists(&mut session, "accounts").await);
    assert!(applied(&mut session).await.is_empty());
    assert!(!dir.path().join("V1__create_rollback.sql").exists());
    assert!(reports.runs().is_empty());
    // The lock belongs to the other run and stays held.
    assert!(is_locked(&mut session).await);
}

#[tokio::test]
async fn test_rollback_files_are_materialized_once() {
    let dir = script_dir(&[("V1__create.sql", "CREATE TABLE accounts (id INTEGER PRIMARY KEY);")]);
    let store = ScriptStore::single_dir(dir.path());
    let executor = MigrationExecutor::new(&store, &NoopReportWriter);
    let mut session = connect().await;

    executor.migrate(&mut session).await.unwrap();
    let rollback = dir.path().join("V1__create_rollback.sql");
    assert_eq!(
        fs::read_to_string(&rollback).unwrap(),
        "DROP TABLE IF EXISTS accounts CASCADE;\n"
    );

    fs::write(&rollback, "DROP TABLE accounts;\n").unwrap();
    fs::write(
        dir.path().join("V2__index.sql"),
        "CREATE INDEX idx_accounts_id ON accounts (id);",
    )
    .unwrap();
    executor.migrate(&mut session).await.unwrap();

    assert_eq!(fs::read_to_string(&rollback).unwrap(), "DROP TABLE accounts;\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("V2__index_rollback.sql")).unwrap(),
        "DROP INDEX IF EXISTS idx_accounts_id;\n"
    );
}

#[tokio::test]
async fn test_separate_rollback_directory() {
    let migrations = script_dir(&[("V1__create.sql", "CREATE TABLE accounts (id INTEGER);")]);
    let rollbacks = tempfile::tempdir().unwrap();
    let down = rollbacks.path().join("down");
    let store = ScriptStore::new(migrations.path(), &down);
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();

    assert!(down.join("V1__create_rollback.sql").is_file());
    assert!(!migrations.path().join("V1__create_rollback.sql").exists());
}

#[tokio::test]
async fn test_plan_lists_only_pending() {
    let dir = script_dir(&[
        ("V1__log.sql", "CREATE TABLE log (step INTEGER NOT NULL);"),
        ("V2__two.sql", "INSERT INTO log (step) VALUES (2);"),
    ]);
    let store = ScriptStore::single_dir(dir.path());
    let executor = MigrationExecutor::new(&store, &NoopReportWriter);
    let mut session = connect().await;

    let plan = executor.plan(&mut session).await.unwrap();
    assert_eq!(plan.len(), 2);
    assert!(!table_exists(&mut session, "log").await);

    executor.migrate(&mut session).await.unwrap();
    fs::write(dir.path().join("V3__three.sql"), "INSERT INTO log (step) VALUES (3);").unwrap();
    let plan: Vec<String> = executor
        .plan(&mut session)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(plan, vec!["V3__three.sql"]);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn test_rollback_to_reverts_everything_above_target() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let mut session = connect().await;

    MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap();
    assert_eq!(row_count(&mut session, "items").await, 3);

    let outcome = RollbackExecutor::new(&store, &reports)
        .rollback_to(&mut session, 2)
        .await
        .unwrap();

    assert_eq!(
        names(outcome.records()),
        vec!["V4__third_item.sql", "V3__second_item.sql"]
    );
    assert!(outcome.records().iter().all(|r| r.status == RecordStatus::RolledBack));
    assert_eq!(
        applied(&mut session).await,
        vec!["V2__first_item.sql", "V1__create_items.sql"]
    );
    assert_eq!(current_version(&mut session).await, 2);
    assert_eq!(row_count(&mut session, "items").await, 1);
    assert!(!is_locked(&mut session).await);

    let runs = reports.runs();
    assert_eq!(runs.last().map(|(kind, _)| *kind), Some(RunKind::Rollback));
}

#[tokio::test]
async fn test_rollback_to_zero_reverts_all() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    let outcome = RollbackExecutor::new(&store, &NoopReportWriter)
        .rollback_to(&mut session, 0)
        .await
        .unwrap();

    assert_eq!(outcome.records().len(), 4);
    assert!(!table_exists(&mut session, "items").await);
    assert_eq!(current_version(&mut session).await, 0);
}

#[tokio::test]
async fn test_rollback_last() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    let rollback = RollbackExecutor::new(&store, &NoopReportWriter);

    let outcome = rollback.rollback_last(&mut session).await.unwrap();
    assert_eq!(names(outcome.records()), vec!["V4__third_item.sql"]);
    assert_eq!(current_version(&mut session).await, 3);
    assert_eq!(row_count(&mut session, "items").await, 2);

    // Reverted scripts become pending again.
    let again = MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    assert_eq!(names(again.records()), vec!["V4__third_item.sql"]);
}

#[tokio::test]
async fn test_rollback_with_empty_ledger() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let rollback = RollbackExecutor::new(&store, &NoopReportWriter);
    let mut session = connect().await;

    assert_eq!(
        rollback.rollback_last(&mut session).await.unwrap(),
        RunOutcome::NothingToDo
    );
    assert_eq!(
        rollback.rollback_to(&mut session, 0).await.unwrap(),
        RunOutcome::NothingToDo
    );
    assert!(!is_locked(&mut session).await);
}

#[tokio::test]
async fn test_rollback_target_out_of_range() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    let rollback = RollbackExecutor::new(&store, &NoopReportWriter);

    let err = rollback.rollback_to(&mut session, 9).await.unwrap_err();
    assert!(matches!(err, MigrateError::InvalidTarget { target: 9, current: 4 }));
    let err = rollback.rollback_to(&mut session, -1).await.unwrap_err();
    assert!(matches!(err, MigrateError::InvalidTarget { target: -1, .. }));

    assert_eq!(
        rollback.rollback_to(&mut session, 4).await.unwrap(),
        RunOutcome::NothingToDo
    );
    assert_eq!(current_version(&mut session).await, 4);
    assert!(!is_locked(&mut session).await);
}

#[tokio::test]
async fn test_missing_rollback_file_aborts_before_executing() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    fs::remove_file(dir.path().join("V3__second_item_rollback.sql")).unwrap();

    let err = RollbackExecutor::new(&store, &NoopReportWriter)
        .rollback_to(&mut session, 1)
        .await
        .unwrap_err();

    match err {
        MigrateError::MissingRollback { script, rollback } => {
            assert_eq!(script, "V3__second_item.sql");
            assert_eq!(rollback, "V3__second_item_rollback.sql");
        }
        other => panic!("expected missing rollback, got {:?}", other),
    }
    // V4's inverse was not executed either.
    assert_eq!(row_count(&mut session, "items").await, 3);
    assert_eq!(current_version(&mut session).await, 4);
    assert!(!is_locked(&mut session).await);
}

#[tokio::test]
async fn test_placeholder_rollback_is_not_executed() {
    let dir = script_dir(&[("V1__pragma.sql", "PRAGMA user_version = 5;")]);
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    let placeholder = fs::read_to_string(dir.path().join("V1__pragma_rollback.sql")).unwrap();
    assert!(placeholder.starts_with("-- No automatic rollback available for V1__pragma.sql."));

    let err = RollbackExecutor::new(&store, &NoopReportWriter)
        .rollback_last(&mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::MissingRollback { .. }));
    assert_eq!(applied(&mut session).await, vec!["V1__pragma.sql"]);
}

#[tokio::test]
async fn test_failed_rollback_keeps_ledger() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let reports = CollectingReports::default();
    let mut session = connect().await;

    MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap();
    fs::write(
        dir.path().join("V3__second_item_rollback.sql"),
        "DELETE FROM no_such_table;\n",
    )
    .unwrap();

    let err = RollbackExecutor::new(&store, &reports)
        .rollback_to(&mut session, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Execution { .. }));
    // V4 was reverted inside the transaction and restored by the abort.
    assert_eq!(row_count(&mut session, "items").await, 3);
    assert_eq!(current_version(&mut session).await, 4);
    assert!(!is_locked(&mut session).await);

    let (kind, records) = reports.runs().pop().unwrap();
    assert_eq!(kind, RunKind::Rollback);
    assert_eq!(records.last().map(|r| r.status), Some(RecordStatus::Failed));
}

#[tokio::test]
async fn test_held_lock_blocks_rollback() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    {
        let (conn, _, lock) = session.parts();
        assert!(lock.acquire(conn).await.unwrap());
    }

    let outcome = RollbackExecutor::new(&store, &NoopReportWriter)
        .rollback_last(&mut session)
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::LockHeld);
    assert_eq!(row_count(&mut session, "items").await, 3);
}

// ============================================================================
// Lock, ledger, status, reports
// ============================================================================

#[tokio::test]
async fn test_lock_cycle() {
    let mut session = connect().await;
    session.bootstrap().await.unwrap();
    let (conn, _, lock) = session.parts();

    assert_eq!(lock.state(conn).await.unwrap(), None);
    assert!(!lock.is_locked(conn).await.unwrap());

    assert!(lock.acquire(conn).await.unwrap());
    assert!(!lock.acquire(conn).await.unwrap());
    let state = lock.state(conn).await.unwrap().unwrap();
    assert!(state.locked);
    assert!(state.locked_at.is_some());

    lock.release(conn).await.unwrap();
    assert!(!lock.is_locked(conn).await.unwrap());
    assert!(lock.acquire(conn).await.unwrap());

    assert!(lock.force_release(conn).await.unwrap());
    assert!(!lock.force_release(conn).await.unwrap());
}

#[tokio::test]
async fn test_ledger_rejects_unversioned_name() {
    let mut session = connect().await;
    session.bootstrap().await.unwrap();
    let (conn, ledger, _) = session.parts();

    let err = ledger.record(conn, "init.sql").await.unwrap_err();
    assert!(matches!(err, MigrateError::InvalidScriptName(_)));

    ledger.record(conn, "V7__seven.sql").await.unwrap();
    ledger.record(conn, "V3__three.sql").await.unwrap();
    assert_eq!(ledger.current_version(conn).await.unwrap(), 7);
    assert_eq!(ledger.names_above(conn, 3).await.unwrap(), vec!["V7__seven.sql"]);

    ledger.remove(conn, "V7__seven.sql").await.unwrap();
    ledger.remove(conn, "V7__seven.sql").await.unwrap();
    assert_eq!(ledger.current_version(conn).await.unwrap(), 3);
}

#[tokio::test]
async fn test_status_report() {
    let dir = items_project();
    let store = ScriptStore::single_dir(dir.path());
    let mut session = connect().await;

    let fresh = status(&mut session).await.unwrap();
    assert_eq!(fresh.current_version, 0);
    assert!(fresh.is_fresh());
    assert!(!fresh.locked);

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();
    let report = status(&mut session).await.unwrap();

    assert_eq!(report.current_version, 4);
    let versions: Vec<i64> = report.entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![4, 3, 2, 1]);
    assert!(report.entries.iter().all(|e| e.applied_at.is_some()));
}

#[tokio::test]
async fn test_custom_table_names() {
    let tables = TableNames {
        history: "schema_log".to_string(),
        lock: "schema_lock".to_string(),
    };
    let dir = script_dir(&[("V1__create.sql", "CREATE TABLE accounts (id INTEGER);")]);
    let store = ScriptStore::single_dir(dir.path());
    let mut session = Session::connect("sqlite::memory:", &tables).await.unwrap();

    MigrationExecutor::new(&store, &NoopReportWriter)
        .migrate(&mut session)
        .await
        .unwrap();

    assert!(table_exists(&mut session, "schema_log").await);
    assert!(table_exists(&mut session, "schema_lock").await);
    assert!(!table_exists(&mut session, "migration_history").await);
}

#[tokio::test]
async fn test_json_reports_on_disk() {
    let dir = items_project();
    let out = tempfile::tempdir().unwrap();
    let store = ScriptStore::single_dir(dir.path());
    let reports = JsonReportWriter::new(out.path());
    let mut session = connect().await;

    MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await
        .unwrap();
    RollbackExecutor::new(&store, &reports)
        .rollback_last(&mut session)
        .await
        .unwrap();

    let migrate_file = out.path().join("migrate/migration_report.json");
    let rollback_file = out.path().join("rollback/rollback_report.json");
    assert!(Path::new(&migrate_file).is_file());
    assert!(Path::new(&rollback_file).is_file());

    let rolled: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(rollback_file).unwrap()).unwrap();
    assert_eq!(rolled[0]["scriptName"], "V4__third_item.sql");
    assert_eq!(rolled[0]["status"], "ROLLED_BACK");
    assert_eq!(reports.read_all(RunKind::Migrate).unwrap().len(), 4);
}
