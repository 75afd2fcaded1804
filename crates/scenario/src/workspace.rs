//! Disposable per-run copies of a submission directory

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;
use webgrade_common::Database;

use crate::error::{ScenarioError, ScenarioResult};

/// How a submission is cloned into a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Top-level directories linked instead of copied (shared read-only)
    #[serde(default = "default_passthrough")]
    pub passthrough: Vec<String>,

    /// Directory or file names skipped wherever they appear in the tree
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Persistent store rebuilt from a fixture schema
    #[serde(default)]
    pub store: Option<StoreFixture>,
}

fn default_passthrough() -> Vec<String> {
    vec![".venv".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec!["flask_session".to_string(), "__pycache__".to_string()]
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            passthrough: default_passthrough(),
            exclude: default_exclude(),
            store: None,
        }
    }
}

/// A SQLite file inside the workspace and the script that recreates it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFixture {
    /// Path of the store relative to the workspace root
    pub file: String,

    /// Schema-definition script replayed into a fresh file
    pub schema: String,
}

/// Isolated copy of a submission, removed on drop
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source: PathBuf,
}

impl Workspace {
    /// Clone `source` into a fresh temporary directory.
    pub fn provision(source: &Path, config: &WorkspaceConfig) -> ScenarioResult<Self> {
        let source = source.canonicalize().map_err(|e| provision_error(source, e))?;
        let dir = tempfile::Builder::new()
            .prefix("webgrade-")
            .tempdir()
            .map_err(|e| provision_error(&source, e))?;

        info!(
            "Provisioning workspace {} from {}",
            dir.path().display(),
            source.display()
        );

        let workspace = Self { dir, source };
        workspace.link_passthrough(config)?;
        workspace.copy_tree(config)?;
        if let Some(store) = &config.store {
            workspace.reset_store(store)?;
        }
        Ok(workspace)
    }

    /// Root of the workspace
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The submission directory this workspace was cloned from
    pub fn source(&self) -> &Path {
        &self.source
    }

    fn link_passthrough(&self, config: &WorkspaceConfig) -> ScenarioResult<()> {
        for name in &config.passthrough {
            let src = self.source.join(name);
            // Only real directories; anything else is copied like any other entry.
            let is_dir = fs::symlink_metadata(&src)
                .map(|m| m.file_type().is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let dst = self.path().join(name);
            symlink(&src, &dst).map_err(|e| provision_error(&dst, e))?;
            debug!("Linked {} -> {}", dst.display(), src.display());
        }
        Ok(())
    }

    fn copy_tree(&self, config: &WorkspaceConfig) -> ScenarioResult<()> {
        let source = self.source.as_path();
        let walker = WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
                !is_excluded(rel, config)
                    && !(entry.file_type().is_dir() && is_passthrough(rel, config))
            });

        let mut copied = 0usize;
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                provision_error(&path, e.into())
            })?;
            let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let dst = self.path().join(rel);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&dst).map_err(|e| provision_error(&dst, e))?;
            } else if file_type.is_symlink() {
                let target = fs::read_link(entry.path()).map_err(|e| provision_error(entry.path(), e))?;
                symlink(&target, &dst).map_err(|e| provision_error(&dst, e))?;
            } else {
                fs::copy(entry.path(), &dst).map_err(|e| provision_error(&dst, e))?;
                copied += 1;
            }
        }

        debug!("Copied {} file(s) into {}", copied, self.path().display());
        Ok(())
    }

    fn reset_store(&self, store: &StoreFixture) -> ScenarioResult<()> {
        let path = self.path().join(&store.file);
        Database::reset(&path, &store.schema).map_err(|e| ScenarioError::Provision {
            path,
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn is_excluded(rel: &Path, config: &WorkspaceConfig) -> bool {
    rel.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        config.exclude.iter().any(|ex| *ex == name)
    })
}

fn is_passthrough(rel: &Path, config: &WorkspaceConfig) -> bool {
    let mut components = rel.components();
    match (components.next(), components.next()) {
        (Some(first), None) => {
            let name = first.as_os_str().to_string_lossy();
            config.passthrough.iter().any(|p| *p == name)
        }
        _ => false,
    }
}

fn provision_error(path: &Path, e: std::io::Error) -> ScenarioError {
    ScenarioError::Provision {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}
