//! Error handling module for FragCut

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for the FragCut application shell
#[derive(Error, Debug)]
pub enum FragCutError {
    /// A required media tool is not installed or not on PATH
    #[error("Media tool not found: {0}. Install FFmpeg or set the path in the configuration")]
    BinaryNotFound(String),

    /// Configuration file could not be read or parsed
    #[error("Invalid configuration in {}: {message}", .path.display())]
    ConfigFile { path: PathBuf, message: String },

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid time format supplied on the command line
    #[error("Invalid time format: {time}. Expected HH:MM:SS.ms, MM:SS.ms, or seconds")]
    InvalidTimeFormat { time: String },

    /// Logging could not be initialized
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// Media library initialization error
    #[error("Failed to initialize the media library: {message}")]
    LibraryInit { message: String },

    /// Request failed in the domain layer
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for FragCut operations
pub type FragCutResult<T> = std::result::Result<T, FragCutError>;
