//! Error types shared across the Rhino workspace

use thiserror::Error;

/// Result type alias for Rhino operations
pub type Result<T> = std::result::Result<T, RhinoError>;

/// Main error type for cross-cutting Rhino concerns
#[derive(Error, Debug)]
pub enum RhinoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
