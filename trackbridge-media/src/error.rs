//! Media bridge error types and handling
//!
//! This module defines the error types surfaced by tracks, sinks and sources,
//! with enough context to tell caller mistakes from native engine failures.

use crate::engine::EngineError;
use crate::validation::ValidationError;
use thiserror::Error;
use trackbridge_core::CoreError;

/// Main error type for media bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Operation attempted on a disposed or already initialized object
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Requested dimensions or format rejected before any native resource
    /// was created
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Registry or dispatcher failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The native engine reported an error code
    #[error("Native operation {operation} failed with code {code}")]
    NativeOperationFailure {
        /// Engine operation name
        operation: &'static str,
        /// Engine-defined error code
        code: i32,
    },

    /// Graphics backend failure
    #[error("Graphics error: {message}")]
    Graphics {
        /// Error message
        message: String,
    },

    /// Frame dimensions that cannot back a buffer
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Bridge initialization failed
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl From<EngineError> for MediaError {
    fn from(error: EngineError) -> Self {
        MediaError::NativeOperationFailure {
            operation: error.operation,
            code: error.code,
        }
    }
}

impl MediaError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        MediaError::InvalidState {
            message: message.into(),
        }
    }

    pub(crate) fn graphics(message: impl Into<String>) -> Self {
        MediaError::Graphics {
            message: message.into(),
        }
    }

    /// Check if error is recoverable
    ///
    /// Recoverable errors leave the object usable; the caller may retry on a
    /// later frame.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::NativeOperationFailure { .. } => true,
            MediaError::Graphics { .. } => true,
            MediaError::InvalidDimensions { .. } => true,
            MediaError::Core(CoreError::NotFound { .. }) => true,
            MediaError::Core(_) => false,
            MediaError::Validation(_) => false,
            MediaError::InvalidState { .. } => false,
            MediaError::Initialization { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::Validation(_) => ErrorCategory::Validation,
            MediaError::Core(e) if e.is_invariant_violation() => ErrorCategory::Invariant,
            MediaError::Core(_) => ErrorCategory::State,
            MediaError::NativeOperationFailure { .. } => ErrorCategory::Native,
            MediaError::Graphics { .. } => ErrorCategory::Graphics,
            MediaError::InvalidDimensions { .. } => ErrorCategory::Validation,
            MediaError::Initialization { .. } => ErrorCategory::System,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Disposed, uninitialized or double-initialized objects
    State,
    /// Unsupported dimensions or formats
    Validation,
    /// Broken programming invariants such as registry conflicts
    Invariant,
    /// Error codes reported by the native engine
    Native,
    /// Graphics backend errors
    Graphics,
    /// Setup errors
    System,
}
