//! Error types for webgrade

use thiserror::Error;

/// Result type alias using the shared webgrade Error
pub type Result<T> = std::result::Result<T, Error>;

/// Shared webgrade error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store reset failed for {path}: {reason}")]
    StoreReset { path: String, reason: String },
}
