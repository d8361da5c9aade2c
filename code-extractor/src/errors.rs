//! Error types for the extraction layer.
//!
//! Per-file problems never surface here: they are folded into records with
//! `status = error`. What remains are the failures that stop a whole batch.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("scan failed: {0}")]
    Scan(String),

    #[error("grammar setup failed: {0}")]
    Grammar(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<walkdir::Error> for ExtractError {
    fn from(e: walkdir::Error) -> Self {
        ExtractError::Scan(e.to_string())
    }
}

impl From<globset::Error> for ExtractError {
    fn from(e: globset::Error) -> Self {
        ExtractError::Config(format!("bad glob: {e}"))
    }
}
