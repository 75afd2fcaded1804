//! webgrade Common Library
//!
//! Shared error types, the SQLite store wrapper, and the environment contract
//! between the grader and the applications it launches.

pub mod db;
pub mod error;

pub use db::Database;
pub use error::{Error, Result};

/// webgrade version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set to `1` in a launched application's environment to enable mock behavior
/// (e.g. canned stock quotes instead of a live lookup).
pub const TEST_MODE_ENV: &str = "BOOTCS_TEST_MODE";

/// Port the launched application is expected to bind on loopback.
pub const PORT_ENV: &str = "FLASK_RUN_PORT";

/// Whether test mode is enabled in the current process environment
pub fn test_mode_enabled() -> bool {
    std::env::var(TEST_MODE_ENV)
        .map(|v| v == "1")
        .unwrap_or(false)
}
