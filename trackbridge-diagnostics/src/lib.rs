//! # TrackBridge Diagnostics
//!
//! Debugging and diagnostic tools for TrackBridge.
//! Provides logging setup, runtime statistics and shutdown leak reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod error;
pub mod leak_report;
pub mod stats;

// Re-export main types
pub use debug_logger::{DebugLogger, DEBUG_DIRECTIVE, DEFAULT_DIRECTIVE};
pub use error::{DiagnosticsError, DiagnosticsResult};
pub use leak_report::{LeakReport, LeakedHandle};
pub use stats::BridgeStats;
