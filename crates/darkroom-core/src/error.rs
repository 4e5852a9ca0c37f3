use std::path::PathBuf;

use thiserror::Error;

/// Core error type for darkroom operations.
#[derive(Error, Debug)]
pub enum DarkroomError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Modal already registered: {0}")]
    DuplicateModal(String),

    #[error("Modal not registered: {0}")]
    UnknownModal(String),

    #[error("Toast not found: {0}")]
    UnknownToast(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DarkroomError {
    fn from(e: serde_json::Error) -> Self {
        DarkroomError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DarkroomError {
    fn from(e: serde_yaml::Error) -> Self {
        DarkroomError::Yaml(e.to_string())
    }
}

/// Result type alias using DarkroomError.
pub type Result<T> = std::result::Result<T, DarkroomError>;
