//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use webgrade_scenario::{ScenarioReport, ScenarioStep, StepOutcome};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for StepOutcome {
    fn headers() -> Vec<&'static str> {
        vec!["", "Step", "Session", "Request", "Status", "Time"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            if self.passed { "✓" } else { "✗" }.to_string(),
            self.name.clone(),
            self.session.clone(),
            format!("{} {}", self.method, self.path),
            self.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            format!("{} ms", self.duration_ms),
        ]
    }
}

impl TableDisplay for ScenarioStep {
    fn headers() -> Vec<&'static str> {
        vec!["Step", "Session", "Request", "Expect"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.expect.status.is_empty() {
            "any".to_string()
        } else {
            self.expect
                .status
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join("/")
        };

        let mut checks = vec![format!("status {}", status)];
        checks.extend(self.expect.contains.iter().map(|c| format!("\"{}\"", c)));
        checks.extend(self.expect.contains_any.iter().map(|g| format!("any of {:?}", g)));
        checks.extend(self.expect.inputs.iter().map(|i| format!("<input {}>", i)));
        checks.extend(self.expect.controls.iter().map(|c| format!("<control {}>", c)));

        vec![
            self.name.clone(),
            self.session.clone(),
            format!("{} {}", self.method, self.path),
            checks.join(", "),
        ]
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", table(items)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in T::headers().iter().zip(item.row()) {
                    if !header.is_empty() {
                        println!("{}: {}", header, value);
                    }
                }
            }
        }
    }
}

/// Print a scenario report, followed by the failure if there was one
pub fn print_report(report: &ScenarioReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(report).unwrap_or_default());
        }
        OutputFormat::Table | OutputFormat::Plain => {
            if !report.steps.is_empty() {
                print_list(&report.steps, format);
            }
            let passed = report.steps.iter().filter(|s| s.passed).count();
            let summary = format!(
                "{}: {}/{} steps passed in {} ms",
                report.name,
                passed,
                report.steps.len(),
                report.duration_ms
            );
            if report.success {
                print_success(&summary);
            } else {
                print_error(&summary);
                if let Some(error) = &report.error {
                    eprintln!("{}", error);
                }
                if report.grader_fault {
                    eprintln!("{}", "Grading could not run; the submission was not judged".yellow());
                }
            }
        }
    }
}

fn table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}
