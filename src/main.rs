use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use testgen::cli::{Cli, Commands};
use testgen::config::Config;
use testgen::logging::init_logging;
use testgen::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config = Config::load(&project_root).unwrap_or_default();

    // The guard MUST be held until program exit to ensure logs are flushed
    let _logging_guard = init_logging(&config.logging, &project_root)?;

    tracing::info!("testgen starting up");
    tracing::debug!("Project root: {}", project_root.display());

    metrics::register_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            testgen::commands::init::run().await?;
        }
        Commands::Generate {
            compile_commands,
            output,
            dry_run,
        } => {
            testgen::commands::generate::run(compile_commands, output, dry_run).await?;
        }
        Commands::Functions { compile_commands } => {
            testgen::commands::functions::run(compile_commands).await?;
        }
        Commands::Stats { prometheus } => {
            testgen::commands::stats::run(prometheus).await?;
        }
    }

    Ok(())
}
