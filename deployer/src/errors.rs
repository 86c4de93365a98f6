//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error(transparent)]
    PipelineError(#[from] PipelineError),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid status transition: {0}")]
    TransitionError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a pipeline stage. All of them end the current run only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The subprocess could not be started.
    #[error("Pipeline initiate error: {0}")]
    InitiateError(String),

    /// The subprocess ran and exited non-zero.
    #[error("Pipeline execute error: {0}")]
    ExecuteError(String),

    /// The artifact was missing, or installing it failed.
    #[error("Pipeline move error: {0}")]
    MoveError(String),
}
