//! EvalMatrix - Prompt-Variant Evaluation Matrix Runner
//!
//! CLI entry point for running and validating evaluation matrices.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use evalmatrix::cli::{Cli, Command};
use evalmatrix::config::EvalConfig;
use evalmatrix::domain::{EvalReport, OVERALL_KEY};
use evalmatrix::runner::EvalRunner;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evalmatrix")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("evalmatrix.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    match cli.command {
        Command::Run {
            eval_file,
            iterations,
            mode,
            concurrency,
            output,
        } => cmd_run(eval_file, iterations, mode, concurrency, output).await,
        Command::Check { eval_file } => cmd_check(eval_file),
    }
}

/// Run an evaluation matrix and report the outcome
async fn cmd_run(
    eval_file: Option<PathBuf>,
    iterations: Option<u32>,
    mode: Option<String>,
    concurrency: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = EvalConfig::load(eval_file.as_ref())?;

    // CLI overrides
    if let Some(iterations) = iterations {
        config.iterations = iterations;
    }
    if let Some(mode) = mode {
        config.execution.mode = mode;
    }
    if let Some(concurrency) = concurrency {
        config.execution.concurrency = Some(concurrency);
    }

    let name = config.name.clone();
    println!(
        "Running {} ({} variants x {} iterations, {} mode)",
        name.bold(),
        config.prompts.len(),
        config.iterations,
        config.execution.mode
    );

    let report = EvalRunner::from_config(config).run().await?;

    print_summary(&report);

    let output_path = output.unwrap_or_else(|| PathBuf::from(format!("{}.report.json", name)));
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    fs::write(&output_path, json).context(format!("Failed to write report to {}", output_path.display()))?;
    println!("\nReport written to {}", output_path.display().to_string().cyan());

    if !report.overall_success {
        std::process::exit(1);
    }
    Ok(())
}

/// Validate an eval file without running anything
fn cmd_check(eval_file: Option<PathBuf>) -> Result<()> {
    let config = EvalConfig::load(eval_file.as_ref())?;
    config.validate()?;

    println!(
        "{} {} ({} variants, {} scorers, {} trials)",
        "ok:".green().bold(),
        config.name,
        config.prompts.len(),
        config.scorers.len(),
        config.prompts.len() * config.iterations as usize
    );
    Ok(())
}

/// Print per-trial and aggregate results
fn print_summary(report: &EvalReport) {
    println!();
    for trial in &report.trials {
        let marker = if trial.success { "PASS".green() } else { "FAIL".red() };
        let mut line = format!(
            "  [{}] trial {:>3}  {:<20} {:>6}ms",
            marker, trial.trial_id, trial.prompt_id, trial.duration_ms
        );
        if let Some(error) = &trial.error {
            line.push_str(&format!("  {}", error.as_str().red()));
        }
        if let Some(path) = &trial.retained_workspace {
            line.push_str(&format!("  retained: {}", path));
        }
        println!("{}", line);
    }

    println!();
    for (scorer, agg) in &report.aggregates {
        if scorer == OVERALL_KEY {
            continue;
        }
        println!(
            "  {:<20} mean {:.2}  min {:.2}  max {:.2}  stddev {:.2}  pass {:.0}%",
            scorer.as_str().bold(),
            agg.mean,
            agg.min,
            agg.max,
            agg.std_dev,
            agg.pass_rate * 100.0
        );
    }

    let overall = if report.overall_success {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "\n{} {}/{} trials passed in {}ms",
        overall,
        report.succeeded(),
        report.trials.len(),
        report.total_duration_ms
    );

    if let Some(usage) = &report.total_resource_usage {
        println!(
            "  usage: {} input / {} output tokens, ${:.4}",
            usage.input_tokens, usage.output_tokens, usage.cost_usd
        );
    }
}
