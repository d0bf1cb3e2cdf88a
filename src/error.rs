//! UML Shield error types.
//!
//! Detection never fails: validators, escapers and the middleware recover
//! every finding into a result object. The variants below cover the
//! operations that can genuinely fail: compiling configured patterns,
//! loading configuration, parsing names from the outside world, and a
//! pluggable HTML sanitizer refusing its input.

use thiserror::Error;

/// UML Shield errors.
#[derive(Error, Debug)]
pub enum ShieldError {
    /// A regex pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Unknown escaping context name.
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// Unknown input type name.
    #[error("Invalid input type: {0}")]
    InvalidInputType(String),

    /// The configured HTML sanitizer failed.
    #[error("Sanitizer error: {0}")]
    Sanitizer(String),

    /// Input exceeds the pipeline size limit.
    #[error("Input too large: {len} > {max}")]
    InputTooLarge {
        /// Input length in bytes.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for UML Shield operations
pub type Result<T> = std::result::Result<T, ShieldError>;

impl From<toml::de::Error> for ShieldError {
    fn from(err: toml::de::Error) -> Self {
        ShieldError::Config(err.to_string())
    }
}
