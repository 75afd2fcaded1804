//! The grading harness a scenario runs inside

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cleanup callback run when the harness scope ends
pub type TeardownFn = Box<dyn FnOnce() + Send + 'static>;

/// Services a scenario consumes from the surrounding test harness
pub trait Harness: Send + Sync {
    /// Directory holding the submission under test
    fn submission_dir(&self) -> &Path;

    /// Whether `rel` names a regular file inside the submission
    fn file_exists(&self, rel: &str) -> bool {
        self.submission_dir().join(rel).is_file()
    }

    fn read_file(&self, rel: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.submission_dir().join(rel))
    }

    /// Register cleanup that must run however the scenario ends
    fn register_teardown(&self, teardown: TeardownFn);
}

/// Harness over a local submission directory.
///
/// Teardowns run in reverse registration order, either through
/// [`LocalHarness::teardown`] or when the harness is dropped.
pub struct LocalHarness {
    submission_dir: PathBuf,
    teardowns: Mutex<Vec<TeardownFn>>,
}

impl LocalHarness {
    pub fn new(submission_dir: impl Into<PathBuf>) -> Self {
        Self {
            submission_dir: submission_dir.into(),
            teardowns: Mutex::new(Vec::new()),
        }
    }

    /// Run every registered teardown now
    pub fn teardown(&self) {
        let pending = std::mem::take(&mut *self.teardowns.lock());
        if !pending.is_empty() {
            debug!("Running {} teardown(s)", pending.len());
        }
        for teardown in pending.into_iter().rev() {
            teardown();
        }
    }

    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.lock().len()
    }
}

impl Harness for LocalHarness {
    fn submission_dir(&self) -> &Path {
        &self.submission_dir
    }

    fn register_teardown(&self, teardown: TeardownFn) {
        self.teardowns.lock().push(teardown);
    }
}

impl Drop for LocalHarness {
    fn drop(&mut self) {
        self.teardown();
    }
}
