//! Create command - scaffold a new migration file

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pgmigrate_core::services::create_migration;

use super::load_config;
use crate::output;

pub fn run(project_dir: &Path, name: &str) -> Result<()> {
    let config = load_config(project_dir)?;
    let path = create_migration(&config.source(), name)?;

    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    output::success(&format!("Created migration: {}", filename));
    println!("{}", format!("File location: {}", path.display()).dimmed());

    Ok(())
}
