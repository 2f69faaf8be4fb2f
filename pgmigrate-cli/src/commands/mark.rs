//! Mark command - record a migration as applied without running it

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use pgmigrate_core::LoggingService;

use super::{get_context, report_event, target_name};
use crate::output;

pub fn run(project_dir: &Path, version: &str, force: bool, logger: &Option<LoggingService>) -> Result<()> {
    let mut ctx = get_context(project_dir)?;

    // Only prompt when someone is there to answer
    if !force && atty::is(atty::Stream::Stdin) {
        println!(
            "\n{}",
            format!("This records version {} as applied without running it.", version).yellow()
        );
        println!("{}\n", "Use it when the schema change already exists in the database.".dimmed());

        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let backend = target_name(ctx.db.as_ref());
    let recorded = ctx
        .runner()
        .with_observer(|event| report_event(logger, "mark", backend, event, false))
        .mark(version)?;

    if recorded {
        output::success(&format!("✓ Version {} marked as applied", version));
    } else {
        println!("{}", format!("Version {} is already applied", version).dimmed());
    }

    Ok(())
}
