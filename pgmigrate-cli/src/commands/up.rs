//! Up command - apply pending migrations

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pgmigrate_core::LoggingService;

use super::{get_context, report_event, target_name};
use crate::output;

pub fn run(
    project_dir: &Path,
    target: Option<&str>,
    json: bool,
    logger: &Option<LoggingService>,
) -> Result<()> {
    let mut ctx = get_context(project_dir)?;
    let backend = target_name(ctx.db.as_ref());

    if !json {
        output::info(&format!(
            "Running migrations from {}",
            ctx.source.dir().display()
        ));
    }

    let result = ctx
        .runner()
        .with_observer(|event| report_event(logger, "up", backend, event, json))
        .migrate(target)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.applied.is_empty() {
        println!("{}", "Database is up to date".dimmed());
    } else {
        output::success(&format!("Applied {} migration(s)", result.applied.len()));
    }
    if result.held_back > 0 {
        println!(
            "{}",
            format!("{} pending migration(s) above the target were left alone", result.held_back).dimmed()
        );
    }

    Ok(())
}

/// Apply everything pending, framed as a deployment step
pub fn deploy(project_dir: &Path, logger: &Option<LoggingService>) -> Result<()> {
    println!("{}", "🚀 Starting deployment...".bold());
    println!("📦 Running database migrations...");

    match run(project_dir, None, false, logger) {
        Ok(()) => {
            output::success("✅ Deployment completed successfully!");
            Ok(())
        }
        Err(e) => Err(e.context("❌ Deployment failed")),
    }
}
