//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// EvalMatrix - Prompt-Variant Evaluation Matrix Runner
#[derive(Parser)]
#[command(
    name = "emx",
    about = "Run prompt-variant evaluation matrices against a project",
    version
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run an evaluation matrix
    Run {
        /// Path to the eval file (falls back to .evalmatrix.yml)
        eval_file: Option<PathBuf>,

        /// Override the configured iteration count
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Override the execution mode (sequential, parallel, parallel-limit)
        #[arg(short, long)]
        mode: Option<String>,

        /// Override the concurrency limit for parallel-limit mode
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Write the JSON report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an eval file without running it
    Check {
        /// Path to the eval file (falls back to .evalmatrix.yml)
        eval_file: Option<PathBuf>,
    },
}
