//! Grade a submission against a scenario

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{info, warn};
use webgrade_scenario::{grade, LocalHarness, ScenarioReport, ScenarioSpec};

use crate::output::{print_report, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Submission directory
    #[arg(short, long, env = "WEBGRADE_SUBMISSION", default_value = ".")]
    pub submission: PathBuf,

    /// Built-in scenario name or path to a scenario YAML file
    #[arg(long, env = "WEBGRADE_SCENARIO", default_value = "finance")]
    pub scenario: String,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,

    /// Override the scenario's overall timeout
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Override the scenario's startup deadline
    #[arg(long)]
    pub startup_timeout_ms: Option<u64>,
}

/// Run the scenario and write `scenario-result.json`; the report says whether
/// the submission passed.
pub async fn execute(args: RunArgs, format: OutputFormat) -> Result<ScenarioReport> {
    let spec = load_spec(&args)?;

    if !args.submission.is_dir() {
        anyhow::bail!("submission directory not found: {}", args.submission.display());
    }

    info!(
        "Grading {} with scenario '{}' ({} steps)",
        args.submission.display(),
        spec.name,
        spec.steps.len()
    );

    let harness = LocalHarness::new(&args.submission);
    let report = grade(&harness, &spec).await;
    harness.teardown();

    print_report(&report, format);
    if let Err(e) = report.write_json(&args.output) {
        warn!("Could not write results: {}", e);
    }

    Ok(report)
}

fn load_spec(args: &RunArgs) -> Result<ScenarioSpec> {
    let mut spec = ScenarioSpec::load(&args.scenario)
        .with_context(|| format!("loading scenario '{}'", args.scenario))?;

    if let Some(secs) = args.timeout_secs {
        spec.timeout_secs = secs;
    }
    if let Some(ms) = args.startup_timeout_ms {
        spec.server.startup_timeout_ms = ms;
    }
    Ok(spec)
}
