//! Panel - dispatch one prompt to several AI coding tools in parallel.

mod config;
mod json_output;
mod manifest;
mod report;
mod run;
mod tools;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use panel_core::{classify, unalias, CompositeId, Diagnosis, Status};
use panel_runner::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use config::Config;
use manifest::Manifest;
use run::RunArgs;

/// Panel - parallel dispatch to AI coding tools
#[derive(Parser)]
#[command(name = "panel")]
#[command(about = "Send one prompt to several AI coding tools at once", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./panel.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt against the selected tools
    Run(RunArgs),

    /// Explain failures from a saved stderr file or a run directory
    Diagnose {
        /// A `.stderr` file, or a run directory containing `run.json`
        path: PathBuf,

        /// Tool name used in the suggestion (defaults to the file stem)
        #[arg(long)]
        tool: Option<String>,

        /// Exit code the tool returned
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        exit_code: i32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("panel=debug")
    } else if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("panel=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let config = Config::load(cli.config.as_deref())?;
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());
            run::execute(args, config, cancel).await?;
        }
        Commands::Diagnose {
            path,
            tool,
            exit_code,
        } => {
            diagnose(&path, tool.as_deref(), exit_code)?;
        }
    }

    Ok(())
}

/// Cancel the run on Ctrl-C. Running tools are terminated and the
/// manifest is still written.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nInterrupted, stopping tools...");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

fn diagnose(path: &Path, tool: Option<&str>, exit_code: i32) -> Result<(), Box<dyn std::error::Error>> {
    if path.is_dir() {
        return diagnose_run(path);
    }

    let stderr = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    let hint = match tool {
        Some(tool) => tool.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    match classify(&hint, &stderr, exit_code) {
        Some(diagnosis) => print_diagnosis(&diagnosis),
        None => println!("No known failure pattern found in {}", path.display()),
    }
    Ok(())
}

/// Diagnose every unsuccessful task recorded in a run directory.
fn diagnose_run(run_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = Manifest::read(run_dir)?;
    let failed: Vec<_> = manifest
        .results
        .iter()
        .filter(|r| r.status != Status::Success.as_str())
        .collect();
    if failed.is_empty() {
        println!("All {} task(s) succeeded", manifest.results.len());
        return Ok(());
    }

    for result in failed {
        println!("{} ({}, exit {})", result.tool_id, result.status, result.exit_code);
        let stderr = std::fs::read_to_string(run_dir.join(&result.stderr_file)).unwrap_or_default();
        let hint = CompositeId::parse(&result.tool_id).base;
        match classify(unalias(hint.as_str()), &stderr, result.exit_code) {
            Some(diagnosis) => print_diagnosis(&diagnosis),
            None => println!("No known failure pattern"),
        }
        println!();
    }
    Ok(())
}

fn print_diagnosis(diagnosis: &Diagnosis) {
    println!("Category:   {}", diagnosis.category);
    println!("Problem:    {}", diagnosis.message);
    println!("Suggestion: {}", diagnosis.suggestion);
}
