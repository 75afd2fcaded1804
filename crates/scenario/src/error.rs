//! Error types for scenario runs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Required file missing from submission: {0}")]
    MissingFile(String),

    #[error("Workspace provisioning failed at {}: {reason}", path.display())]
    Provision { path: PathBuf, reason: String },

    #[error("Could not allocate a free port: {0}")]
    PortAllocation(#[source] std::io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server did not accept connections on port {port} within {waited:?}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    StartupTimeout {
        port: u16,
        waited: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("Server exited before becoming ready ({status})\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ProcessExited {
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Request failed in step '{step}': {source}")]
    Request {
        step: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Step '{step}' failed: expected {expected}, got {actual}\nresponse body:\n{body}")]
    Assertion {
        step: String,
        expected: String,
        actual: String,
        body: String,
    },

    #[error("Scenario timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scenario spec error: {0}")]
    SpecParse(String),

    #[error("Store error: {0}")]
    Store(#[from] webgrade_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScenarioError {
    /// Whether the grading host, rather than the submission, is at fault.
    /// A missing interpreter or an unwritable temp dir lands here.
    pub fn is_grader_fault(&self) -> bool {
        match self {
            ScenarioError::Provision { .. }
            | ScenarioError::PortAllocation(_)
            | ScenarioError::Spawn { .. }
            | ScenarioError::SpecParse(_)
            | ScenarioError::Store(_)
            | ScenarioError::Io(_)
            | ScenarioError::Json(_)
            | ScenarioError::Yaml(_)
            | ScenarioError::Http(_) => true,
            ScenarioError::MissingFile(_)
            | ScenarioError::StartupTimeout { .. }
            | ScenarioError::ProcessExited { .. }
            | ScenarioError::Request { .. }
            | ScenarioError::Assertion { .. }
            | ScenarioError::Timeout(_) => false,
        }
    }
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;
