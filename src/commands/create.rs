//! `schemashift create <description>`

use anyhow::Result;
use colored::*;

use super::script_store;
use crate::config::Config;

/// Scaffold the next versioned migration file.
pub fn run(config: &Config, description: &str) -> Result<()> {
    println!("{}", "📝 Creating Migration".cyan().bold());
    println!();

    let path = script_store(config).create(description)?;

    println!("  {} {}", "✓ Created:".green(), path.display());
    println!();
    println!("  Add your SQL to the file, then run:");
    println!("    {} to review", "schemashift plan".cyan());
    println!("    {} to apply", "schemashift migrate".cyan());
    Ok(())
}
