//! webgrade CLI - Main Entry Point
//!
//! Exit codes for `run`: 0 when every step passes, 1 when the submission
//! fails, 2 when grading itself could not proceed.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webgrade_cli::commands::{run, scenario};
use webgrade_cli::output::{self, OutputFormat};

/// webgrade - run a submitted web application and grade it against a scenario
#[derive(Parser)]
#[command(name = "webgrade")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission
    Run(run::RunArgs),

    /// Inspect scenarios
    #[command(subcommand)]
    Scenario(scenario::ScenarioCommands),

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            output::print_error(&format!("Failed to create tokio runtime: {}", e));
            std::process::exit(2);
        }
    };

    let code = rt.block_on(async {
        match cli.command {
            Commands::Run(args) => match run::execute(args, cli.format).await {
                Ok(report) if report.success => 0,
                Ok(report) if report.grader_fault => 2,
                Ok(_) => 1,
                Err(e) => {
                    output::print_error(&format!("{:#}", e));
                    2
                }
            },
            Commands::Scenario(cmd) => match scenario::execute(cmd, cli.format).await {
                Ok(()) => 0,
                Err(e) => {
                    output::print_error(&format!("{:#}", e));
                    2
                }
            },
            Commands::Version => {
                println!("webgrade v{}", webgrade_common::VERSION);
                0
            }
        }
    });

    drop(rt);
    std::process::exit(code);
}
