//! Error types for the TrackBridge core

use crate::handle::NativeHandle;
use thiserror::Error;

/// Main error type for registry and dispatch operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A handle was registered while a previous registration was still present
    #[error("Native handle {handle} is already registered")]
    RegistryConflict {
        /// Handle that collided
        handle: NativeHandle,
    },

    /// No live wrapper is registered for the handle
    #[error("No live wrapper registered for native handle {handle}")]
    NotFound {
        /// Handle that failed to resolve
        handle: NativeHandle,
    },

    /// The registered wrapper is not of the requested type
    #[error("Native handle {handle} is not a {expected}")]
    TypeMismatch {
        /// Handle that resolved to another wrapper type
        handle: NativeHandle,
        /// Requested wrapper type name
        expected: &'static str,
    },

    /// The consumer side of the dispatcher has been torn down
    #[error("Dispatcher consumer has been shut down")]
    DispatcherClosed,

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error signals a broken programming invariant rather than
    /// a condition the caller can expect at runtime
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            CoreError::RegistryConflict { .. } | CoreError::TypeMismatch { .. }
        )
    }

    /// Get the handle this error refers to, if any
    pub fn handle(&self) -> Option<NativeHandle> {
        match self {
            CoreError::RegistryConflict { handle }
            | CoreError::NotFound { handle }
            | CoreError::TypeMismatch { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}
