use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use runall_core::manager::{RunManager, RunManagerConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// Environment variable holding the log filter, e.g. `RUNALL_LOG=runall_core=debug`
const LOG_ENV: &str = "RUNALL_LOG";

/// runall - Run package scripts in parallel or in sequence
#[derive(Parser)]
#[command(name = "runall")]
#[command(about = "Run package scripts in parallel or in sequence")]
#[command(version)]
struct Cli {
    /// Path to the package manifest
    #[arg(long, global = true, default_value = "package.json")]
    package: PathBuf,

    /// Path to a run configuration file (defaults to .runall.yml next to the manifest)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks matching the given names or patterns
    Run(commands::run::RunArgs),
    /// Show the tasks the given patterns resolve to without running them
    Plan {
        /// Task names or glob-like patterns, e.g. "build:*"
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Arguments appended to every task
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// List the scripts in the registry
    List,
    /// Print the JSON schema of the run configuration file
    Schema,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    if let Commands::Schema = cli.command {
        commands::schema::execute()?;
        return Ok(ExitCode::SUCCESS);
    }

    let manager = RunManager::new(RunManagerConfig {
        package_path: cli.package,
        config_path: cli.config,
    })
    .map_err(|e| anyhow::anyhow!("Failed to load scripts: {}", e))?;

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::Run(args) => commands::run::execute(&manager, args).await,
        Commands::Plan { patterns, args } => {
            commands::plan::execute(&manager, &patterns, &args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            commands::list::execute(&manager)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
