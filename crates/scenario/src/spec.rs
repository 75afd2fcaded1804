//! Declarative YAML scenario fixtures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ScenarioError, ScenarioResult};
use crate::process::SupervisorConfig;
use crate::workspace::WorkspaceConfig;

/// Fixtures compiled into the binary, by name
const BUILTIN: &[(&str, &str)] = &[("finance", include_str!("../fixtures/finance.yaml"))];

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Files the submission must contain before anything is launched
    #[serde(default)]
    pub required_files: Vec<String>,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    pub server: SupervisorConfig,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Outer bound on the whole run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    120
}

/// One request and what its response must look like
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub name: String,

    /// Session issuing the request; sessions are created on first use
    #[serde(default = "default_session")]
    pub session: String,

    #[serde(default)]
    pub method: Method,

    pub path: String,

    /// Form fields for POST requests
    #[serde(default)]
    pub form: BTreeMap<String, String>,

    #[serde(default)]
    pub expect: Expectation,
}

fn default_session() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Assertions checked against a response, in field order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectation {
    /// Accepted status codes; empty accepts any
    #[serde(default)]
    pub status: Vec<u16>,

    /// Substrings that must all appear in the body
    #[serde(default)]
    pub contains: Vec<String>,

    /// Groups of alternatives; each group needs at least one match
    #[serde(default)]
    pub contains_any: Vec<Vec<String>>,

    /// Names that must appear on an `<input>` element
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Names that must appear on an `<input>` or `<select>` element
    #[serde(default)]
    pub controls: Vec<String>,
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> ScenarioResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> ScenarioResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look up a fixture compiled into the crate
    pub fn builtin(name: &str) -> ScenarioResult<Self> {
        let (_, yaml) = BUILTIN
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| ScenarioError::SpecParse(format!("Unknown built-in scenario: {}", name)))?;
        Self::from_yaml(yaml)
    }

    /// Names of the compiled-in fixtures
    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.iter().map(|(n, _)| *n).collect()
    }

    /// Resolve a built-in name or a path to a YAML file
    pub fn load(name_or_path: &str) -> ScenarioResult<Self> {
        let path = Path::new(name_or_path);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Self::builtin(name_or_path)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> ScenarioResult<()> {
        if self.steps.is_empty() {
            return Err(ScenarioError::SpecParse(format!(
                "Scenario '{}' has no steps",
                self.name
            )));
        }
        for step in &self.steps {
            if !step.path.starts_with('/') {
                return Err(ScenarioError::SpecParse(format!(
                    "Step '{}' path must start with '/': {}",
                    step.name, step.path
                )));
            }
            if step.method == Method::Get && !step.form.is_empty() {
                return Err(ScenarioError::SpecParse(format!(
                    "Step '{}' is a GET but declares form fields",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_spec() {
        let yaml = r#"
name: hello
server:
  entry:
    program: ./server
    args: ["--port", "{port}"]
steps:
  - name: home redirects
    path: /
    expect:
      status: [302]
  - name: login
    session: alice
    method: post
    path: /login
    form:
      username: alice
      password: secret
    expect:
      status: [302, 303]
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "hello");
        assert_eq!(spec.steps.len(), 2);
        assert_eq!(spec.steps[0].session, "default");
        assert_eq!(spec.steps[0].method, Method::Get);
        assert_eq!(spec.steps[1].method, Method::Post);
        assert_eq!(spec.steps[1].form.get("username").map(String::as_str), Some("alice"));
        assert_eq!(spec.request_timeout(), Duration::from_secs(30));
        assert_eq!(spec.timeout(), Duration::from_secs(120));
        assert!(spec.workspace.store.is_none());
    }

    #[test]
    fn test_reject_relative_path() {
        let yaml = r#"
name: bad
server:
  entry:
    program: ./server
steps:
  - name: oops
    path: login
"#;
        assert!(matches!(
            ScenarioSpec::from_yaml(yaml),
            Err(ScenarioError::SpecParse(_))
        ));
    }

    #[test]
    fn test_reject_empty_steps() {
        let yaml = r#"
name: empty
server:
  entry:
    program: ./server
steps: []
"#;
        assert!(matches!(
            ScenarioSpec::from_yaml(yaml),
            Err(ScenarioError::SpecParse(_))
        ));
    }

    #[test]
    fn test_builtin_finance_fixture() {
        let spec = ScenarioSpec::builtin("finance").unwrap();
        assert_eq!(spec.name, "finance");
        assert_eq!(spec.required_files, vec!["app.py".to_string()]);
        assert_eq!(spec.timeout(), Duration::from_secs(120));

        let store = spec.workspace.store.as_ref().unwrap();
        assert_eq!(store.file, "finance.db");
        assert!(store.schema.contains("CREATE TABLE users"));
        assert!(store.schema.contains("CREATE TABLE transactions"));

        assert_eq!(spec.server.entry.program, "python3");
        assert!(spec.server.entry.args.iter().any(|a| a == "{port}"));

        let quote = spec
            .steps
            .iter()
            .find(|s| s.name == "valid quote returns price")
            .unwrap();
        assert_eq!(quote.expect.status, vec![200]);
        assert!(quote.expect.contains.contains(&"28.00".to_string()));

        let duplicate = spec
            .steps
            .iter()
            .find(|s| s.name == "duplicate username rejected")
            .unwrap();
        let register = spec
            .steps
            .iter()
            .find(|s| s.name == "registration succeeds")
            .unwrap();
        assert_ne!(duplicate.session, register.session);
        assert_eq!(duplicate.expect.status, vec![400]);
    }

    #[test]
    fn test_finance_trades_may_render_a_page() {
        use crate::session::HttpResponse;

        let spec = ScenarioSpec::builtin("finance").unwrap();
        fn named<'a>(spec: &'a ScenarioSpec, name: &str) -> &'a ScenarioStep {
            spec.steps.iter().find(|s| s.name == name).unwrap()
        }
        let page = HttpResponse {
            status: 200,
            location: None,
            body: "<p>Bought!</p>".to_string(),
        };

        for name in ["buy succeeds", "sell succeeds"] {
            assert_eq!(named(&spec, name).expect.status, vec![200, 302, 303]);
            assert!(named(&spec, name).expect.check(&page).is_ok());
        }
        for name in ["registration succeeds", "login succeeds"] {
            assert_eq!(named(&spec, name).expect.status, vec![302, 303]);
            assert!(named(&spec, name).expect.check(&page).is_err());
        }

        let after_sell = named(&spec, "portfolio shows holdings after sell");
        assert!(after_sell.expect.status.is_empty());
        let redirected = HttpResponse {
            status: 302,
            location: Some("/login".to_string()),
            body: "cash $9,944.00, 2 x AAAA = $56.00".to_string(),
        };
        assert!(after_sell.expect.check(&redirected).is_ok());
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(ScenarioSpec::builtin("nope").is_err());
        assert_eq!(ScenarioSpec::builtin_names(), vec!["finance"]);
    }
}
