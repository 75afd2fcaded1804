//! SQLite database for the persistent store of a graded application

use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Suffixes SQLite may leave beside a database file.
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// Database wrapper over a single SQLite connection
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Expose the underlying connection for callers that run their own queries.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

impl Database {
    /// Open an existing database (or create an empty one) at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        debug!("Opened database at {:?}", path.as_ref());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Delete whatever store lives at `path` and rebuild it from `schema`.
    ///
    /// Any journal/WAL sidecars are removed too, so rows written by an earlier
    /// run can never be replayed into the fresh file.
    pub fn reset(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let path = path.as_ref();

        for stale in std::iter::once(path.to_path_buf()).chain(sidecar_paths(path)) {
            match std::fs::remove_file(&stale) {
                Ok(()) => debug!("Removed stale store file {}", stale.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::StoreReset {
                        path: stale.display().to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        let db = Self::open(path)?;
        db.apply_schema(schema).map_err(|e| Error::StoreReset {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!("Reset store at {}", path.display());
        Ok(db)
    }

    /// Replay a schema-definition script
    pub fn apply_schema(&self, schema: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(schema)?;
        Ok(())
    }

    /// Names of all user tables, sorted
    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Row count of a table
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

fn sidecar_paths(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    SIDECAR_SUFFIXES.iter().map(move |suffix| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    })
}
