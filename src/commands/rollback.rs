//! `schemashift rollback [<version>]`

use anyhow::Result;
use colored::*;

use super::{open_session, print_header, report_writer, script_store};
use crate::config::Config;
use crate::error::MigrateError;
use crate::executor::{RollbackExecutor, RunOutcome};

/// Revert the last migration, or every migration above `target`.
pub async fn run(config: &Config, target: Option<i64>) -> Result<()> {
    match target {
        Some(version) => print_header(&format!("Rolling back to version {}:", version), config),
        None => print_header("Rolling back last migration:", config),
    }

    let store = script_store(config);
    let reports = report_writer(config);
    let mut session = open_session(config).await?;

    let executor = RollbackExecutor::new(&store, &reports);
    let result = match target {
        Some(version) => executor.rollback_to(&mut session, version).await,
        None => executor.rollback_last(&mut session).await,
    };
    session.close().await?;

    match result {
        Ok(RunOutcome::Completed(records)) => {
            for record in &records {
                println!("  {} {}", "↩".green(), record.script_name);
            }
            println!();
            println!(
                "{} {} migration(s) rolled back",
                "✓ Done:".green().bold(),
                records.len()
            );
        }
        Ok(RunOutcome::NothingToDo) => {
            println!("{}", "No migrations to roll back.".green());
        }
        Ok(RunOutcome::LockHeld) => {
            println!(
                "{}",
                "⚠️  A migration run is in progress in another process. Nothing was run."
                    .yellow()
            );
        }
        Err(err @ MigrateError::MissingRollback { .. }) => {
            println!("  {} {}", "✗".red(), err);
            println!(
                "  Write the inverse statements into {} and retry.",
                store.rollbacks_dir().display().to_string().cyan()
            );
            return Err(err.into());
        }
        Err(err @ MigrateError::Execution { .. }) => {
            println!(
                "{}",
                "Rollback FAILED. The database was left as it was before this run."
                    .red()
                    .bold()
            );
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
