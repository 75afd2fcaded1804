//! webgrade scenario supervisor
//!
//! Grades a submitted web application by running it for real:
//! - Clones the submission into a disposable workspace and resets its store
//! - Launches the entry point in its own process group on a free port
//! - Waits until the port accepts TCP connections
//! - Drives cookie-scoped sessions through a YAML scenario, fail-fast
//! - Tears the process group down on every exit path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 run_scenario(harness, spec)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  allocate_port() -> u16                                     │
//! │  Workspace::provision(submission, config) -> Workspace      │
//! │  ProcessSupervisor::start(workspace, port) -> TargetProcess │
//! │    └── harness.register_teardown(ProcessGroup::terminate)   │
//! │  ScenarioRunner::run(steps)                                 │
//! │    └── Session (one cookie jar per simulated visitor)       │
//! │  TargetProcess::stop()  SIGTERM -> grace -> SIGKILL         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── required_files, workspace, server                    │
//! │    └── steps: [{ name, session, method, path, form,         │
//! │                  expect { status, contains, contains_any,   │
//! │                           inputs, controls } }]             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod expect;
pub mod harness;
pub mod port;
pub mod process;
pub mod runner;
pub mod session;
pub mod spec;
pub mod workspace;

pub use error::{ScenarioError, ScenarioResult};
pub use harness::{Harness, LocalHarness};
pub use port::allocate_port;
pub use process::{EntryPoint, ProcessGroup, ProcessState, ProcessSupervisor, SupervisorConfig, TargetProcess};
pub use runner::{grade, run_scenario, ScenarioReport, ScenarioRunner, StepOutcome};
pub use session::{HttpResponse, Session};
pub use spec::{Expectation, Method, ScenarioSpec, ScenarioStep};
pub use workspace::{StoreFixture, Workspace, WorkspaceConfig};
