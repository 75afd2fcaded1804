//! Inspect scenario fixtures

use anyhow::{Context, Result};
use clap::Subcommand;
use webgrade_scenario::ScenarioSpec;

use crate::output::{print_list, OutputFormat};

#[derive(Subcommand)]
pub enum ScenarioCommands {
    /// List built-in scenarios
    List,

    /// Show the steps of a scenario
    Show {
        /// Built-in scenario name or path to a scenario YAML file
        scenario: String,
    },

    /// Parse and validate a scenario file
    Validate {
        /// Path to a scenario YAML file
        path: std::path::PathBuf,
    },
}

pub async fn execute(cmd: ScenarioCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ScenarioCommands::List => {
            for name in ScenarioSpec::builtin_names() {
                let spec = ScenarioSpec::builtin(name)?;
                println!("{:<12} {} ({} steps)", name, spec.description, spec.steps.len());
            }
        }
        ScenarioCommands::Show { scenario } => {
            let spec = ScenarioSpec::load(&scenario)
                .with_context(|| format!("loading scenario '{}'", scenario))?;
            if format == OutputFormat::Table {
                println!("{}: {}", spec.name, spec.description);
                if !spec.required_files.is_empty() {
                    println!("requires: {}", spec.required_files.join(", "));
                }
            }
            print_list(&spec.steps, format);
        }
        ScenarioCommands::Validate { path } => {
            let spec = ScenarioSpec::from_file(&path)
                .with_context(|| format!("validating {}", path.display()))?;
            println!("✅ {} is valid ({} steps)", spec.name, spec.steps.len());
        }
    }
    Ok(())
}
