//! Status command - show applied and pending migrations

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pgmigrate_core::services::MigrationStore;

use super::get_context;
use crate::output;

pub fn run(project_dir: &Path, json: bool) -> Result<()> {
    let mut ctx = get_context(project_dir)?;
    let report = ctx.runner().status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let survey = MigrationStore::new(&ctx.source).survey()?;
    let filenames: HashMap<&str, &str> = survey
        .migrations
        .iter()
        .map(|m| (m.version.as_str(), m.filename.as_str()))
        .collect();

    println!("{}", "Migration Status".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Version", "Migration", "Status", "Applied at"]);

    for entry in &report.applied {
        let applied_at = entry
            .applied_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let (filename, state) = match filenames.get(entry.version.as_str()) {
            Some(name) => (name.to_string(), "applied".green().to_string()),
            None => ("(file missing)".dimmed().to_string(), "applied".yellow().to_string()),
        };
        table.add_row(vec![
            entry.version.clone(),
            filename,
            state,
            applied_at,
        ]);
    }
    for pending in &report.pending {
        table.add_row(vec![
            pending.version.clone(),
            pending.filename.clone(),
            "pending".yellow().to_string(),
            String::new(),
        ]);
    }

    println!("{}", table);
    println!();
    println!(
        "Applied: {}  Pending: {}",
        report.applied.len(),
        report.pending.len()
    );

    if !report.orphaned.is_empty() {
        output::warning(&format!(
            "⚠ Applied version(s) with no migration file: {}",
            report.orphaned.join(", ")
        ));
    }
    for problem in &report.problems {
        output::warning(&format!("⚠ {}", problem));
    }

    Ok(())
}
