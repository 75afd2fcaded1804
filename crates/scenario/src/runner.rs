//! Scenario runner - drives sessions through steps and owns the run lifecycle

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{ScenarioError, ScenarioResult};
use crate::harness::Harness;
use crate::port::allocate_port;
use crate::process::{ProcessGroup, ProcessSupervisor};
use crate::session::Session;
use crate::spec::{Method, ScenarioSpec, ScenarioStep};
use crate::workspace::Workspace;

/// Longest response body carried in an assertion error
const BODY_EXCERPT_CHARS: usize = 2000;

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub session: String,
    pub method: Method,
    pub path: String,
    pub status: Option<u16>,
    pub passed: bool,
    pub duration_ms: u64,
}

/// Result of a whole scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepOutcome>,
    pub error: Option<String>,

    /// The failure lies with the grading host, not the submission
    #[serde(default)]
    pub grader_fault: bool,

    /// Process group of the launched target, if it got that far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pgid: Option<i32>,
}

impl ScenarioReport {
    /// Write the report as pretty JSON into `output_dir`
    pub fn write_json(&self, output_dir: &Path) -> ScenarioResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("scenario-result.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Executes steps in order against one running target, fail-fast
pub struct ScenarioRunner {
    base_url: String,
    request_timeout: Duration,
    sessions: HashMap<String, Session>,
    outcomes: Vec<StepOutcome>,
}

impl ScenarioRunner {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout,
            sessions: HashMap::new(),
            outcomes: Vec::new(),
        }
    }

    /// Steps executed so far, including a failing last step
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// The named session, opened on first use
    pub fn session(&mut self, name: &str) -> ScenarioResult<&Session> {
        if !self.sessions.contains_key(name) {
            debug!("Opening session '{}'", name);
            let session = Session::new(self.base_url.clone(), self.request_timeout)?;
            self.sessions.insert(name.to_string(), session);
        }
        Ok(&self.sessions[name])
    }

    /// Run every step; the first failure stops the run.
    pub async fn run(&mut self, steps: &[ScenarioStep]) -> ScenarioResult<()> {
        for step in steps {
            self.run_step(step).await?;
        }
        Ok(())
    }

    pub async fn run_step(&mut self, step: &ScenarioStep) -> ScenarioResult<()> {
        let start = Instant::now();
        info!("{} {} [{}] - {}", step.method, step.path, step.session, step.name);

        let session = self.session(&step.session)?;
        let response = match step.method {
            Method::Get => session.get(&step.path).await,
            Method::Post => {
                let fields: Vec<(&String, &String)> = step.form.iter().collect();
                session.post_form(&step.path, &fields).await
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.record(step, None, false, start);
                error!("✗ {} - request failed: {}", step.name, e);
                return Err(match e {
                    ScenarioError::Http(source) => ScenarioError::Request {
                        step: step.name.clone(),
                        source,
                    },
                    other => other,
                });
            }
        };

        if let Err(mismatch) = step.expect.check(&response) {
            self.record(step, Some(response.status), false, start);
            error!("✗ {} - expected {}, got {}", step.name, mismatch.expected, mismatch.actual);
            return Err(ScenarioError::Assertion {
                step: step.name.clone(),
                expected: mismatch.expected,
                actual: mismatch.actual,
                body: excerpt(&response.body),
            });
        }

        self.record(step, Some(response.status), true, start);
        info!("✓ {}", step.name);
        Ok(())
    }

    fn record(&mut self, step: &ScenarioStep, status: Option<u16>, passed: bool, start: Instant) {
        self.outcomes.push(StepOutcome {
            name: step.name.clone(),
            session: step.session.clone(),
            method: step.method,
            path: step.path.clone(),
            status,
            passed,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= BODY_EXCERPT_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    cut.push_str("\n... (truncated)");
    cut
}

/// Run a scenario against the harness's submission, failing on the first
/// error. The target process is always stopped before returning.
pub async fn run_scenario(harness: &dyn Harness, spec: &ScenarioSpec) -> ScenarioResult<ScenarioReport> {
    let (report, result) = run_reported(harness, spec).await;
    result.map(|()| report)
}

/// Like [`run_scenario`], but folds any failure into the report.
pub async fn grade(harness: &dyn Harness, spec: &ScenarioSpec) -> ScenarioReport {
    let (report, _) = run_reported(harness, spec).await;
    report
}

async fn run_reported(
    harness: &dyn Harness,
    spec: &ScenarioSpec,
) -> (ScenarioReport, ScenarioResult<()>) {
    let started_at = Utc::now();
    let start = Instant::now();
    let mut steps = Vec::new();

    let launched: Mutex<Option<ProcessGroup>> = Mutex::new(None);

    let span = info_span!("scenario", name = %spec.name);
    let result = {
        // Kept alive past the deadline so the target is terminated gracefully
        // before its handle is dropped.
        let run = execute(harness, spec, &mut steps, &launched);
        tokio::pin!(run);

        match tokio::time::timeout(spec.timeout(), &mut run)
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let group = launched.lock().clone();
                if let Some(group) = group {
                    warn!(
                        "Scenario '{}' exceeded {:?}, terminating process group {}",
                        spec.name,
                        spec.timeout(),
                        group.pgid()
                    );
                    group.terminate_async(spec.server.grace_period()).await;
                }
                Err(ScenarioError::Timeout(spec.timeout()))
            }
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => info!("Scenario '{}' passed ({} ms)", spec.name, duration_ms),
        Err(e) => error!("Scenario '{}' failed: {}", spec.name, e),
    }

    let report = ScenarioReport {
        name: spec.name.clone(),
        success: result.is_ok(),
        started_at,
        duration_ms,
        steps,
        error: result.as_ref().err().map(|e| e.to_string()),
        grader_fault: result.as_ref().err().is_some_and(ScenarioError::is_grader_fault),
        pgid: launched.into_inner().map(|g| g.pgid()),
    };
    (report, result)
}

async fn execute(
    harness: &dyn Harness,
    spec: &ScenarioSpec,
    outcomes: &mut Vec<StepOutcome>,
    launched: &Mutex<Option<ProcessGroup>>,
) -> ScenarioResult<()> {
    for file in &spec.required_files {
        if !harness.file_exists(file) {
            return Err(ScenarioError::MissingFile(file.clone()));
        }
        info!("{} exists", file);
    }

    // Declared before the target so it outlives the process on every path.
    let workspace = Workspace::provision(harness.submission_dir(), &spec.workspace)?;
    let port = allocate_port()?;

    let supervisor = ProcessSupervisor::new(spec.server.clone());
    let mut target = supervisor.spawn(workspace.path(), port)?;

    let group = target.process_group();
    let grace = supervisor.config().grace_period();
    *launched.lock() = Some(group.clone());
    harness.register_teardown(Box::new(move || group.terminate(grace)));

    target.wait_until_ready(supervisor.config()).await?;

    let mut runner = ScenarioRunner::new(target.base_url(), spec.request_timeout());
    let result = drive(&mut runner, &spec.steps, outcomes).await;

    target.stop().await;
    drop(runner);
    drop(workspace);
    result
}

async fn drive(
    runner: &mut ScenarioRunner,
    steps: &[ScenarioStep],
    outcomes: &mut Vec<StepOutcome>,
) -> ScenarioResult<()> {
    for step in steps {
        let result = runner.run_step(step).await;
        if let Some(last) = runner.outcomes().last() {
            outcomes.push(last.clone());
        }
        result?;
    }
    Ok(())
}
