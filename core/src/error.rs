//! Error types for the restomod core

use thiserror::Error;

/// Core error type for restomod operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid fallback image table: {0}")]
    InvalidFallbackTable(String),

    #[error("No vehicle or part selected")]
    NoSubjectSelected,

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("{0}")]
    Other(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
