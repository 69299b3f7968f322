//! Diagnostics error types

use thiserror::Error;

/// Errors raised while setting up logging or exporting reports
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    /// Log filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// Directive that failed to parse
        directive: String,
        /// Parser message
        reason: String,
    },

    /// Report could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for diagnostics operations
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;
