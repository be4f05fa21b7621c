//! `schemashift unlock`: clear a lock left behind by a crashed run.

use anyhow::Result;
use colored::*;

use super::{open_session, print_header};
use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    print_header("🔓 Releasing migration lock", config);

    let mut session = open_session(config).await?;
    session.bootstrap().await?;
    let (conn, _, lock) = session.parts();
    let was_locked = lock.force_release(conn).await?;
    session.close().await?;

    if was_locked {
        println!("  {} Lock released", "✓".green());
    } else {
        println!("  {} Lock was not held", "○".dimmed());
    }
    Ok(())
}
