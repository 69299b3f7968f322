//! Structured debug logging system

use crate::error::{DiagnosticsError, DiagnosticsResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter used when debug logging is requested and `RUST_LOG` is unset
pub const DEBUG_DIRECTIVE: &str = "trackbridge=debug,trackbridge_core=debug,trackbridge_media=debug";
/// Filter used otherwise
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the process-wide `tracing` subscriber
#[derive(Debug, Clone)]
pub struct DebugLogger {
    directive: String,
}

impl DebugLogger {
    /// Create a logger with the fallback filter for `debug_logging`
    pub fn new(debug_logging: bool) -> Self {
        let directive = if debug_logging {
            DEBUG_DIRECTIVE
        } else {
            DEFAULT_DIRECTIVE
        };
        Self {
            directive: directive.to_string(),
        }
    }

    /// Create a logger with an explicit fallback filter
    pub fn with_directive(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
        }
    }

    /// Fallback filter directive
    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Build the filter: `RUST_LOG` when set and valid, the fallback otherwise
    pub fn filter(&self) -> DiagnosticsResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.directive).map_err(|e| DiagnosticsError::InvalidFilter {
            directive: self.directive.clone(),
            reason: e.to_string(),
        })
    }

    /// Install the subscriber
    ///
    /// Returns `false` when a global subscriber was already installed, in
    /// which case nothing changes.
    pub fn install(&self) -> DiagnosticsResult<bool> {
        let filter = self.filter()?;
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            debug!("Logging initialized with fallback filter '{}'", self.directive);
        }
        Ok(installed)
    }

    /// Initialize logging system
    pub fn init_logging(debug_logging: bool) -> DiagnosticsResult<()> {
        Self::new(debug_logging).install().map(|_| ())
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new(false)
    }
}
