//! Error types for script-lifecycle.
//!
//! Per-unit failures (bad registrations, failing actions, broken scripts) are
//! never returned to callers; they become diagnostics in the event log.
//! This enum covers the remaining surfaces: configuration, documents, and
//! script hosts reporting why an evaluation failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid work id: {0:?}")]
    InvalidId(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
