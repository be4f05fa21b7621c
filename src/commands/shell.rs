//! `schemashift shell`: interactive prompt over the other commands.

use anyhow::Result;
use colored::*;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::config::Config;

/// One parsed prompt line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Migrate,
    Rollback(Option<i64>),
    Status,
    Plan,
    Unlock,
    Create(String),
    Help,
    Exit,
}

/// Parse a prompt line. `Ok(None)` for a blank line; `Err` carries the
/// message to show the user.
pub fn parse_shell_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match command.to_ascii_lowercase().as_str() {
        "migrate" => ShellCommand::Migrate,
        "rollback" => match rest.as_slice() {
            [] => ShellCommand::Rollback(None),
            [version] => match version.parse::<i64>() {
                Ok(v) if v >= 0 => ShellCommand::Rollback(Some(v)),
                _ => {
                    return Err(format!(
                        "invalid version '{}': expected a number of 0 or more",
                        version
                    ));
                }
            },
            _ => return Err("usage: rollback [<version>]".to_string()),
        },
        "status" => ShellCommand::Status,
        "plan" => ShellCommand::Plan,
        "unlock" => ShellCommand::Unlock,
        "create" if rest.is_empty() => return Err("usage: create <description>".to_string()),
        "create" => ShellCommand::Create(rest.join(" ")),
        "help" | "?" => ShellCommand::Help,
        "exit" | "quit" => ShellCommand::Exit,
        other => {
            return Err(format!(
                "unknown command '{}' (type 'help' for the list)",
                other
            ));
        }
    };
    if !rest.is_empty()
        && matches!(
            command,
            ShellCommand::Migrate
                | ShellCommand::Status
                | ShellCommand::Plan
                | ShellCommand::Unlock
                | ShellCommand::Help
                | ShellCommand::Exit
        )
    {
        return Err(format!("'{}' takes no arguments", line.trim()));
    }
    Ok(Some(command))
}

fn print_help() {
    println!("  {}              apply pending migrations", "migrate".cyan());
    println!("  {}             roll back the last migration", "rollback".cyan());
    println!("  {}   roll back every migration above <version>", "rollback <version>".cyan());
    println!("  {}               show applied migrations and lock state", "status".cyan());
    println!("  {}                 preview the next migrate", "plan".cyan());
    println!("  {}               release a stale lock", "unlock".cyan());
    println!("  {}   scaffold a new migration", "create <description>".cyan());
    println!("  {}                 leave the shell", "exit".cyan());
}

/// Run the prompt loop until `exit` or end of input. Command failures are
/// printed and the loop continues.
pub async fn run(config: &Config) -> Result<()> {
    println!("{}", "schemashift shell".cyan().bold());
    println!("  Type {} for commands, {} to quit.", "help".cyan(), "exit".cyan());
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = dirs::cache_dir().map(|p| p.join("schemashift/history.txt"));
    if let Some(path) = history_path.as_ref().filter(|p| p.exists()) {
        rl.load_history(path).ok();
    }

    loop {
        let line = match rl.readline("schemashift> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {}", "Error:".red(), err);
                break;
            }
        };

        let command = match parse_shell_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("  {} {}", "✗".red(), message);
                continue;
            }
        };
        rl.add_history_entry(line.trim())?;

        let result = match command {
            ShellCommand::Migrate => super::migrate::run(config).await,
            ShellCommand::Rollback(target) => super::rollback::run(config, target).await,
            ShellCommand::Status => super::status::run(config).await,
            ShellCommand::Plan => super::plan::run(config).await,
            ShellCommand::Unlock => super::unlock::run(config).await,
            ShellCommand::Create(description) => super::create::run(config, &description),
            ShellCommand::Help => {
                print_help();
                Ok(())
            }
            ShellCommand::Exit => break,
        };
        if let Err(err) = result {
            println!("  {} {:#}", "Error:".red().bold(), err);
        }
        println!();
    }

    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        rl.save_history(&path).ok();
    }
    println!("Goodbye.");
    Ok(())
}
