//! Down command - roll back applied migrations

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pgmigrate_core::LoggingService;

use super::{get_context, report_event, target_name};
use crate::output;

pub fn run(project_dir: &Path, steps: usize, json: bool, logger: &Option<LoggingService>) -> Result<()> {
    let mut ctx = get_context(project_dir)?;
    let backend = target_name(ctx.db.as_ref());

    let result = ctx
        .runner()
        .with_observer(|event| report_event(logger, "down", backend, event, json))
        .rollback(steps)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.rolled_back.is_empty() && result.skipped.is_empty() {
        println!("{}", "Nothing to roll back".dimmed());
        return Ok(());
    }

    output::success(&format!("Rolled back {} migration(s)", result.rolled_back.len()));
    if !result.skipped.is_empty() {
        output::warning(&format!(
            "Removed {} ledger entry(s) without a migration file: {}",
            result.skipped.len(),
            result.skipped.join(", ")
        ));
    }

    Ok(())
}
