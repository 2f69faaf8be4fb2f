//! pgmigrate CLI - versioned SQL migrations in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, create, down, logs, mark, status, up};
use pgmigrate_core::LoggingService;

/// pgmigrate - apply, roll back and inspect SQL migrations
#[derive(Parser)]
#[command(name = "pgmigrate", version, about, long_about = None)]
struct Cli {
    /// Project directory holding pgmigrate.json, .env and the migrations
    #[arg(long, global = true, env = "PGMIGRATE_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up {
        /// Stop after this version (inclusive)
        target: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll back the most recently applied migrations
    Down {
        /// Number of migrations to roll back
        #[arg(default_value = "1")]
        steps: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration file
    Create {
        /// Migration name (lowercased, non-alphanumerics become '_')
        name: String,
    },

    /// Record a migration as applied without running it
    Mark {
        /// Version to record
        version: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Check migration files and the ledger for problems
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all pending migrations as a deployment step
    Deploy,

    /// View and manage the pgmigrate event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Up { .. } => "up",
            Commands::Down { .. } => "down",
            Commands::Status { .. } => "status",
            Commands::Create { .. } => "create",
            Commands::Mark { .. } => "mark",
            Commands::Check { .. } => "check",
            Commands::Deploy => "deploy",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();

    // One event log instance per process; commands borrow it
    let logger = commands::get_logger();
    if let Some(l) = &logger {
        let _ = l.log_command(command);
    }

    match run(cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(l) = &logger {
                let _ = l.log_command_failed(command, &e.to_string(), &format!("{:#}", e));
            }
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, logger: &Option<LoggingService>) -> Result<()> {
    let project_dir = commands::project_dir(cli.project_dir)?;
    match cli.command {
        Commands::Up { target, json } => up::run(&project_dir, target.as_deref(), json, logger),
        Commands::Down { steps, json } => down::run(&project_dir, steps, json, logger),
        Commands::Status { json } => status::run(&project_dir, json),
        Commands::Create { name } => create::run(&project_dir, &name),
        Commands::Mark { version, force } => mark::run(&project_dir, &version, force, logger),
        Commands::Check { json } => check::run(&project_dir, json),
        Commands::Deploy => up::deploy(&project_dir, logger),
        Commands::Logs { command } => logs::run(command, logger),
    }
}
