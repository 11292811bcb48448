//! Error types for Continuum

use thiserror::Error;

/// Main error type for Continuum operations
#[derive(Error, Debug)]
pub enum ContinuumError {
    /// A caller referenced a level name not configured on this instance
    #[error("Unknown memory level: {0}")]
    UnknownLevel(String),

    /// A payload could not be reduced to a level's feature shape.
    /// Absorbed at the level boundary with a default embedding; only
    /// surfaced when a caller encodes directly.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Continuum operations
pub type Result<T> = std::result::Result<T, ContinuumError>;
