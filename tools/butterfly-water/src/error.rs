//! Error types for the water index generator
//!
//! Only conditions that abort a whole build are errors. Geometric and
//! topological anomalies inside the data are logged and skipped by the
//! individual passes instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for butterfly-water operations
#[derive(Debug, Error)]
pub enum Error {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required upstream input is not available
    #[error("Missing required input {what}: {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The coordinate lookup for coastline nodes failed as a whole
    #[error("Cannot resolve coastline nodes: {0}")]
    UnresolvedNodes(String),

    /// Malformed water index data
    #[error("Invalid water index: {0}")]
    Format(String),

    /// Dataset decoding error
    #[error("Dataset error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file decoding error
    #[error("Configuration file error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience result type for butterfly-water operations
pub type Result<T> = std::result::Result<T, Error>;
