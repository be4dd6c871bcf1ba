use std::path::PathBuf;

use thiserror::Error;

use crate::document::DocumentError;

/// Errors that fail a whole request. Finer-grained problems (a rule that
/// matches nothing, an insertion that fails) are recorded as diagnostics on
/// the copy report instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("source document not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("document error: {0}")]
    Load(#[from] DocumentError),

    #[error("failed to rasterize page: {0}")]
    Rasterization(String),

    #[error("failed to recognize page text: {0}")]
    Recognition(String),

    #[error("invalid rules: {0}")]
    InvalidRules(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to package generated documents: {0}")]
    Packaging(String),

    #[error("worker task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
