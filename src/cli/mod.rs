use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "testgen")]
#[command(author, version, about = "Streaming unit test generator for C and C++ codebases")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize testgen in the current directory
    Init,

    /// Generate unit tests for the project
    Generate {
        /// Path to compile_commands.json (default: <root>/compile_commands.json,
        /// falling back to a directory scan)
        #[arg(short, long)]
        compile_commands: Option<PathBuf>,

        /// Output directory for generated tests (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Validate the setup and list work without calling the provider
        #[arg(long)]
        dry_run: bool,
    },

    /// List testable functions without generating anything
    Functions {
        /// Path to compile_commands.json
        #[arg(short, long)]
        compile_commands: Option<PathBuf>,
    },

    /// Show pipeline metrics
    Stats {
        /// Output in Prometheus format
        #[arg(long)]
        prometheus: bool,
    },
}
