//! Error kinds shared across the pipeline (§7).
//!
//! Library APIs return `Result<T, RepolensError>`; the CLI layer wraps these
//! with `anyhow::Context` the way the teacher's `cli/index.rs` does, and
//! prints a single `Error: ...` line on stderr before exiting 1 (§6/§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepolensError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("full-text search module is unavailable in this sqlite build")]
    FtsMissing,

    #[error("bm25() ranking function is unavailable; falling back to a constant score")]
    Bm25Missing,

    #[error("full-text search syntax error: {0}")]
    FtsSyntax(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("index is stale: {0}")]
    StaleIndex(String),

    #[error("forbidden pattern found in emitted content: {0}")]
    ForbiddenPattern(String),

    #[error("zone marker asymmetry: {0}")]
    ZoneAsymmetry(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepolensError>;
