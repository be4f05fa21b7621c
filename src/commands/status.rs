//! `schemashift status`

use anyhow::Result;
use colored::*;

use super::{open_session, print_header, script_store};
use crate::config::Config;

/// Print the current version, the applied scripts and the lock state.
pub async fn run(config: &Config) -> Result<()> {
    print_header("📋 Migration Status", config);

    let mut session = open_session(config).await?;
    let report = crate::status::status(&mut session).await?;
    session.close().await?;

    println!("  Current version: {}", report.current_version.to_string().cyan().bold());
    if report.locked {
        println!("  Lock:            {}", "HELD".red().bold());
        println!(
            "  Run {} if no migration is running.",
            "schemashift unlock".cyan()
        );
    } else {
        println!("  Lock:            {}", "free".green());
    }
    println!();

    if report.is_fresh() {
        println!("  {} No migrations applied yet", "○".dimmed());
    } else {
        println!("  {} applied migration(s):", report.entries.len());
        for entry in &report.entries {
            let applied_at = entry
                .applied_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!(
                "  {} {:>6}  {}  {}",
                "✓".green(),
                entry.version,
                entry.script_name,
                applied_at.dimmed()
            );
        }
    }

    // Pending count is informational; an unreadable directory is not fatal here.
    match script_store(config).list_pending() {
        Ok(scripts) => {
            let applied: Vec<&str> = report.entries.iter().map(|e| e.script_name.as_str()).collect();
            let pending = scripts
                .iter()
                .filter(|s| !applied.contains(&s.name.as_str()))
                .count();
            println!();
            if pending == 0 {
                println!("  {} Up to date", "✓".green());
            } else {
                println!(
                    "  {} {} pending. Run {} to apply.",
                    "○".yellow(),
                    pending,
                    "schemashift migrate".cyan()
                );
            }
        }
        Err(err) => tracing::warn!(error = %err, "cannot list migration scripts"),
    }
    Ok(())
}
