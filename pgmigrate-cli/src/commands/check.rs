//! Check command - health checks over migration files and the ledger

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;
use pgmigrate_core::adapters;
use pgmigrate_core::ports::{Database, Dialect};
use pgmigrate_core::services::{CheckStatus, DoctorService};

use super::load_config;
use crate::output;

pub fn run(project_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(project_dir)?;
    let source = config.source();

    // The ledger check needs a database; everything else works offline
    let mut db: Option<Box<dyn Database>> = match config.database_url.as_deref() {
        Some(url) => match adapters::connect_existing(url) {
            Ok(Some(db)) => Some(db),
            Ok(None) => {
                if !json {
                    output::warning("⚠ Skipping ledger check: database file does not exist yet");
                }
                None
            }
            Err(e) => {
                if !json {
                    output::warning(&format!("⚠ Skipping ledger check: {}", e));
                }
                None
            }
        },
        None => None,
    };

    let dialect = match (&db, config.database_url.as_deref()) {
        (Some(db), _) => db.dialect(),
        (None, Some(url)) if matches!(adapters::parse_target(url), Ok(adapters::Target::Postgres(_))) => {
            Dialect::Postgres
        }
        (None, Some(_)) => Dialect::DuckDb,
        (None, None) => Dialect::Postgres,
    };

    let doctor = DoctorService::new(&source, dialect);
    let ledger = config.ledger();
    let result = match db.as_mut() {
        Some(db) => doctor.run_checks(Some(db.as_mut()), &ledger)?,
        None => doctor.run_checks(None, &ledger)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", "Migration Health Check".bold());
        println!();

        for (name, check) in &result.checks {
            let marker = match check.status {
                CheckStatus::Pass => "✓".green(),
                CheckStatus::Warning => "⚠".yellow(),
                CheckStatus::Error => "✗".red(),
            };
            println!("{} {}: {}", marker, name.bold(), check.message);
            if check.status != CheckStatus::Pass {
                for detail in check.details.iter().flatten() {
                    println!("    {}", detail.to_string().dimmed());
                }
            }
        }

        println!();
        println!(
            "{} passed, {} warning(s), {} error(s)",
            result.summary.passed, result.summary.warnings, result.summary.errors
        );
    }

    if !result.is_healthy() {
        bail!("Health check found {} error(s)", result.summary.errors);
    }
    Ok(())
}
