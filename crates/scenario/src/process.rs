//! Process supervision - launching the submission, readiness probing, teardown

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{ScenarioError, ScenarioResult};

const PORT_PLACEHOLDER: &str = "{port}";

/// Lifecycle of a launched target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Ready,
    Stopped,
}

/// Command used to start the submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Program looked up on PATH when no bundled interpreter exists
    pub program: String,

    /// Interpreter inside the workspace preferred over `program`
    #[serde(default)]
    pub bundle: Option<PathBuf>,

    /// Arguments; `{port}` is replaced with the allocated port
    #[serde(default)]
    pub args: Vec<String>,
}

impl EntryPoint {
    /// Pick the bundled interpreter if the workspace carries one.
    pub fn resolve(&self, workspace: &Path) -> PathBuf {
        if let Some(bundle) = &self.bundle {
            let candidate = workspace.join(bundle);
            if candidate.exists() {
                info!("Using bundled interpreter: {}", candidate.display());
                return candidate;
            }
            info!(
                "No bundled interpreter at {}, using {}",
                candidate.display(),
                self.program
            );
        }
        PathBuf::from(&self.program)
    }
}

/// Configuration for launching and supervising a target process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub entry: EntryPoint,

    /// Extra environment; values may contain `{port}`
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Variable carrying the allocated port
    #[serde(default = "default_port_env")]
    pub port_env: Option<String>,

    /// Variable set to `1` so the submission can enable mock behavior
    #[serde(default = "default_test_mode_env")]
    pub test_mode_env: Option<String>,

    /// Overall deadline for the port to accept a connection
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Delay between readiness checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout of a single readiness connect
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Time between SIGTERM and SIGKILL on shutdown
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_port_env() -> Option<String> {
    Some(webgrade_common::PORT_ENV.to_string())
}

fn default_test_mode_env() -> Option<String> {
    Some(webgrade_common::TEST_MODE_ENV.to_string())
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_connect_timeout_ms() -> u64 {
    100
}

fn default_grace_period_ms() -> u64 {
    500
}

impl SupervisorConfig {
    /// Configuration with default timings for the given entry point
    pub fn new(entry: EntryPoint) -> Self {
        Self {
            entry,
            env: BTreeMap::new(),
            port_env: default_port_env(),
            test_mode_env: default_test_mode_env(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Launches submissions and hands back supervised [`TargetProcess`] handles
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start the entry point in `workspace` and wait until `port` accepts a
    /// TCP connection.
    pub async fn start(&self, workspace: &Path, port: u16) -> ScenarioResult<TargetProcess> {
        let mut target = self.spawn(workspace, port)?;
        target.wait_until_ready(&self.config).await?;
        Ok(target)
    }

    /// Launch without waiting; the target stays `Starting` until
    /// [`TargetProcess::wait_until_ready`] succeeds. Must be called from within
    /// a tokio runtime.
    pub fn spawn(&self, workspace: &Path, port: u16) -> ScenarioResult<TargetProcess> {
        let program = self.config.entry.resolve(workspace);
        let port_str = port.to_string();

        let mut cmd = Command::new(&program);
        cmd.args(
            self.config
                .entry
                .args
                .iter()
                .map(|a| a.replace(PORT_PLACEHOLDER, &port_str)),
        )
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

        for (key, value) in &self.config.env {
            cmd.env(key, value.replace(PORT_PLACEHOLDER, &port_str));
        }
        if let Some(var) = &self.config.port_env {
            cmd.env(var, &port_str);
        }
        if let Some(var) = &self.config.test_mode_env {
            cmd.env(var, "1");
        }

        info!("Spawning {} on port {}", program.display(), port);

        let mut child = cmd.spawn().map_err(|e| ScenarioError::Spawn {
            program: program.display().to_string(),
            source: e,
        })?;

        let pid = child.id().ok_or_else(|| ScenarioError::Spawn {
            program: program.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "process exited immediately"),
        })?;

        let output = CapturedOutput::attach(&mut child);
        Ok(TargetProcess {
            child,
            group: ProcessGroup::new(pid),
            output,
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            state: ProcessState::Starting,
            grace: self.config.grace_period(),
        })
    }
}

/// Handle to a launched submission
pub struct TargetProcess {
    child: Child,
    group: ProcessGroup,
    output: CapturedOutput,
    port: u16,
    base_url: String,
    state: ProcessState,
    grace: Duration,
}

impl TargetProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Cloneable termination handle, suitable for teardown registration
    pub fn process_group(&self) -> ProcessGroup {
        self.group.clone()
    }

    /// Output captured so far
    pub fn stdout(&self) -> String {
        self.output.stdout()
    }

    pub fn stderr(&self) -> String {
        self.output.stderr()
    }

    /// Poll until the port accepts a TCP connection. On timeout or early exit
    /// the group is killed and the target is `Stopped`.
    pub async fn wait_until_ready(&mut self, config: &SupervisorConfig) -> ScenarioResult<()> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let start = Instant::now();
        let deadline = start + config.startup_timeout();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let connect_timeout = config.connect_timeout().min(remaining);

            if let Ok(Ok(_stream)) = timeout(connect_timeout, TcpStream::connect(addr)).await {
                debug!("Port {} accepted a connection after {} attempt(s)", self.port, attempts);
                self.state = ProcessState::Ready;
                info!("Server is ready at {}", self.base_url);
                return Ok(());
            }

            if let Ok(Some(status)) = self.child.try_wait() {
                self.group.kill();
                self.state = ProcessState::Stopped;
                self.output.finish().await;
                return Err(ScenarioError::ProcessExited {
                    status: status.to_string(),
                    stdout: self.output.stdout(),
                    stderr: self.output.stderr(),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if attempts == 1 {
                info!("Waiting for server to accept connections on port {}...", self.port);
            }
            sleep(config.poll_interval().min(remaining)).await;
        }

        let waited = start.elapsed();
        warn!(
            "Port {} not ready after {:?} ({} attempts), killing process group",
            self.port, waited, attempts
        );
        self.group.kill();
        let _ = timeout(Duration::from_millis(200), self.child.wait()).await;
        self.state = ProcessState::Stopped;
        self.output.finish().await;

        Err(ScenarioError::StartupTimeout {
            port: self.port,
            waited,
            stdout: self.output.stdout(),
            stderr: self.output.stderr(),
        })
    }

    /// Stop the server: SIGTERM the group, wait the grace period, SIGKILL the
    /// group, then reap. Safe to call repeatedly and after the process exited.
    pub async fn stop(&mut self) {
        if self.state == ProcessState::Stopped {
            return;
        }
        info!("Stopping server (pgid: {})", self.group.pgid());

        self.group.terminate_async(self.grace).await;
        if timeout(Duration::from_secs(2), self.child.wait()).await.is_err() {
            warn!("Server (pid: {}) was not reaped after SIGKILL", self.group.pgid());
        }
        self.state = ProcessState::Stopped;
        self.output.finish().await;
    }
}

/// Last resort for a target dropped without `stop()`: no grace period. A group
/// already terminated through any [`ProcessGroup`] clone is left alone.
impl Drop for TargetProcess {
    fn drop(&mut self) {
        if self.state != ProcessState::Stopped && !self.group.is_stopped() {
            warn!("Target on port {} dropped while running, killing its group", self.port);
            self.group.kill();
        }
    }
}

/// The process group a target was launched into.
///
/// All clones share one stopped flag: the first termination wins and later
/// calls return immediately.
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    pgid: i32,
    stopped: Arc<AtomicBool>,
}

impl ProcessGroup {
    fn new(pid: u32) -> Self {
        Self {
            pgid: pid as i32,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Two-phase escalation, blocking the calling thread for `grace`.
    pub fn terminate(&self, grace: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.signal(Signal::SIGTERM) {
            std::thread::sleep(grace);
        }
        self.signal(Signal::SIGKILL);
    }

    /// Two-phase escalation without blocking the runtime.
    pub async fn terminate_async(&self, grace: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.signal(Signal::SIGTERM) {
            sleep(grace).await;
        }
        self.signal(Signal::SIGKILL);
    }

    /// Immediate SIGKILL of the whole group.
    pub fn kill(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.signal(Signal::SIGKILL);
    }

    /// Returns false if the group no longer exists.
    fn signal(&self, signal: Signal) -> bool {
        match killpg(Pid::from_raw(self.pgid), signal) {
            Ok(()) => true,
            Err(e) => {
                debug!("{} to process group {} failed: {}", signal, self.pgid, e);
                false
            }
        }
    }
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// stdout/stderr drained into memory for diagnostics
struct CapturedOutput {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    readers: Vec<JoinHandle<()>>,
}

impl CapturedOutput {
    fn attach(child: &mut Child) -> Self {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let mut readers = Vec::new();

        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, stdout.clone())));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, stderr.clone())));
        }

        Self {
            stdout,
            stderr,
            readers,
        }
    }

    fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock()).into_owned()
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock()).into_owned()
    }

    /// Wait briefly for the readers to hit EOF once the process is gone.
    async fn finish(&mut self) {
        for reader in self.readers.drain(..) {
            if timeout(Duration::from_millis(200), reader).await.is_err() {
                debug!("Output reader still open after process exit");
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R, buffer: SharedBuffer) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
        }
    }
}
