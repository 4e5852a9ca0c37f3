use std::path::PathBuf;
use std::process::ExitStatus;

/// Schema import error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Generator failed for {} ({status}): {stderr}", schema.display())]
    Generator {
        schema: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Invalid schema document {}: {message}", path.display())]
    InvalidSchema { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] darkroom_core::DarkroomError),
}

/// Result type alias for schema import.
pub type Result<T> = std::result::Result<T, Error>;
