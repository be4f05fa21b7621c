//! `schemashift migrate`

use anyhow::Result;
use colored::*;

use super::{open_session, print_header, report_writer, script_store};
use crate::config::Config;
use crate::error::MigrateError;
use crate::executor::{MigrationExecutor, RunOutcome};

/// Apply every pending migration.
pub async fn run(config: &Config) -> Result<()> {
    print_header("Migrating:", config);

    let store = script_store(config);
    let reports = report_writer(config);
    let mut session = open_session(config).await?;

    let result = MigrationExecutor::new(&store, &reports)
        .migrate(&mut session)
        .await;
    session.close().await?;

    match result {
        Ok(RunOutcome::Completed(records)) => {
            for record in &records {
                println!("  {} {}", "✓".green(), record.script_name);
            }
            println!();
            println!(
                "{} {} migration(s) applied",
                "✓ Done:".green().bold(),
                records.len()
            );
        }
        Ok(RunOutcome::NothingToDo) => {
            println!("{}", "No migrations to apply.".green());
        }
        Ok(RunOutcome::LockHeld) => {
            println!(
                "{}",
                "⚠️  Migration is already in progress by another process. Nothing was run."
                    .yellow()
            );
        }
        Err(MigrateError::Execution { script, source }) => {
            println!("  {} {}", "✗".red(), script.red());
            println!();
            println!(
                "{}",
                "Migration FAILED. All changes of this run were rolled back.".red().bold()
            );
            return Err(MigrateError::Execution { script, source }.into());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
