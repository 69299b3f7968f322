//! Shutdown leak reporting
//!
//! Anything still registered once every track has been disposed is a leak:
//! either a wrapper that is still referenced somewhere, or one dropped
//! without being disposed.

use crate::error::DiagnosticsResult;
use crate::stats::short_type_name;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use trackbridge_core::{DispatcherStats, HandleRegistry, NativeHandle};

/// One handle left in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakedHandle {
    /// Registered handle
    pub handle: NativeHandle,
    /// Wrapper type
    pub wrapper: String,
    /// Whether the wrapper is still referenced
    pub wrapper_alive: bool,
}

/// Handles left behind at shutdown
#[derive(Debug, Clone, Serialize)]
pub struct LeakReport {
    /// Report time
    pub generated_at: DateTime<Utc>,
    /// Leaked handles in handle order
    pub leaks: Vec<LeakedHandle>,
    /// Dispatched actions discarded without running
    pub dropped_actions: u64,
}

impl LeakReport {
    /// Build a report from whatever the registry still holds
    pub fn collect(registry: &HandleRegistry, dispatcher: DispatcherStats) -> Self {
        let leaks = registry
            .snapshot()
            .into_iter()
            .map(|info| LeakedHandle {
                handle: info.handle,
                wrapper: short_type_name(info.type_name),
                wrapper_alive: info.alive,
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            leaks,
            dropped_actions: dispatcher.dropped,
        }
    }

    /// Whether nothing leaked
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }

    /// Leaks whose wrapper was dropped without dispose
    pub fn undisposed(&self) -> impl Iterator<Item = &LeakedHandle> {
        self.leaks.iter().filter(|leak| !leak.wrapper_alive)
    }

    /// Emit one log line per leak
    pub fn log(&self) {
        if self.is_clean() {
            info!("✅ No native handles leaked");
            return;
        }
        for leak in &self.leaks {
            if leak.wrapper_alive {
                warn!("{} {} still registered at shutdown", leak.wrapper, leak.handle);
            } else {
                warn!("{} {} was dropped without dispose", leak.wrapper, leak.handle);
            }
        }
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> DiagnosticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct VideoTrack;

    #[test]
    fn test_empty_registry_is_clean() {
        let report = LeakReport::collect(&HandleRegistry::new(), DispatcherStats::default());
        assert!(report.is_clean());
        assert_eq!(report.undisposed().count(), 0);
    }

    #[test]
    fn test_report_distinguishes_alive_and_dropped() {
        let registry = HandleRegistry::new();
        let kept = Arc::new(VideoTrack);
        let dropped = Arc::new(VideoTrack);
        registry.register(NativeHandle::from_raw(0x1010), &dropped).unwrap();
        registry.register(NativeHandle::from_raw(0x1000), &kept).unwrap();
        drop(dropped);

        let report = LeakReport::collect(
            &registry,
            DispatcherStats {
                dropped: 2,
                ..DispatcherStats::default()
            },
        );

        assert_eq!(report.leaks.len(), 2);
        assert_eq!(report.leaks[0].handle, NativeHandle::from_raw(0x1000));
        assert!(report.leaks[0].wrapper_alive);
        assert_eq!(report.leaks[0].wrapper, "VideoTrack");
        let undisposed: Vec<_> = report.undisposed().map(|leak| leak.handle).collect();
        assert_eq!(undisposed, vec![NativeHandle::from_raw(0x1010)]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["dropped_actions"], 2);
        assert_eq!(json["leaks"][1]["handle"], 0x1010);
    }
}
