//! Error types for the cadgraph pipeline

use std::io;
use thiserror::Error;

/// Main error type for cadgraph operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// IO error occurred during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid upload: unsupported extension, oversize or empty file
    #[error("Invalid input: {0}")]
    Input(String),

    /// External parser could not produce an artifact
    #[error("Parse error: {0}")]
    Parse(String),

    /// Artifact could not be decoded under any tried encoding
    #[error("Decode error: {0}")]
    Decode(String),

    /// Entity source could not be opened
    #[error("Source error: {0}")]
    Source(String),

    /// Malformed graph payload; never retried
    #[error("Payload error: {0}")]
    Payload(String),

    /// Transient write failure; retried with backoff before promotion
    #[error("Transient write error: {0}")]
    TransientWrite(String),

    /// Write failure that aborts the ingest
    #[error("Fatal write error: {0}")]
    FatalWrite(String),

    /// Graph store rejected the credentials; never retried
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Graph store is unavailable; never retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Error confined to an enrichment job
    #[error("Job execution error: {0}")]
    JobExecution(String),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),
}

impl PipelineError {
    /// Whether this error aborts an ingest without any retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::TransientWrite(_))
    }
}

/// Result type alias for cadgraph operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<String> for PipelineError {
    fn from(s: String) -> Self {
        PipelineError::Custom(s)
    }
}

impl From<&str> for PipelineError {
    fn from(s: &str) -> Self {
        PipelineError::Custom(s.to_string())
    }
}
