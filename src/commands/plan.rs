//! `schemashift plan`: dry run of the next migrate.

use anyhow::Result;
use colored::*;

use super::{open_session, print_header, report_writer, script_store};
use crate::config::Config;
use crate::executor::MigrationExecutor;
use crate::script::{MigrationScript, ScriptStore};
use crate::synth;

/// List pending scripts with the rollback each would get. Executes nothing.
///
/// Without a configured database every script on disk is listed.
pub async fn run(config: &Config) -> Result<()> {
    print_header("📋 Migration Plan (dry-run)", config);

    let store = script_store(config);
    let pending = if config.database.url.is_some() {
        let reports = report_writer(config);
        let mut session = open_session(config).await?;
        let pending = MigrationExecutor::new(&store, &reports)
            .plan(&mut session)
            .await;
        session.close().await?;
        pending?
    } else {
        println!(
            "  {} no database configured, listing every script",
            "○".dimmed()
        );
        println!();
        store.list_pending()?
    };

    if pending.is_empty() {
        println!("{}", "✓ Nothing to apply".green());
        return Ok(());
    }

    println!("┌─ {} ({} scripts) ─────────────────────────────────┐", "UP".green().bold(), pending.len());
    for (i, script) in pending.iter().enumerate() {
        let statements = synth::lexer::split_statements(&script.body).len();
        println!("│ {}. {} ({} statements)", i + 1, script.name.cyan(), statements);
    }
    println!("└──────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ {} ─────────────────────────────────────────────┐", "DOWN".yellow().bold());
    for script in pending.iter().rev() {
        print_rollback_preview(&store, script);
    }
    println!("└──────────────────────────────────────────────────────────────┘");
    Ok(())
}

fn print_rollback_preview(store: &ScriptStore, script: &MigrationScript) {
    println!("│ {}", script.name.bold());
    if let Ok(existing) = store.read_rollback(&script.name) {
        println!("│   {} (existing file)", "kept".dimmed());
        for line in existing.lines().filter(|l| !l.trim().is_empty()) {
            println!("│   {}", line.yellow());
        }
        return;
    }

    let synthesis = synth::synthesize_detailed(&script.body);
    if synthesis.is_empty() {
        println!("│   {} no automatic rollback, write one by hand", "⚠️".yellow());
        return;
    }
    for warning in synthesis.warnings() {
        println!("│   {} {}", "⚠️".yellow(), warning);
    }
    for statement in synthesis.unmatched() {
        let first_line = statement.lines().next().unwrap_or_default();
        println!("│   {} {}", "not inverted:".dimmed(), first_line.dimmed());
    }
    for line in synthesis.sql().lines() {
        println!("│   {}", line.yellow());
    }
}
