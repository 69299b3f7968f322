//! Point-in-time bridge statistics

use crate::error::DiagnosticsResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use trackbridge_core::{DispatcherStats, HandleRegistry};

/// Registry and dispatcher counters captured at one instant
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Registry entries, live or not
    pub registry_entries: usize,
    /// Entries whose wrapper is alive
    pub live_entries: usize,
    /// Entries whose wrapper was dropped without dispose
    pub dead_entries: usize,
    /// Live entries per wrapper type
    pub live_by_type: BTreeMap<String, usize>,
    /// Dispatcher counters
    pub dispatcher: DispatcherStats,
}

impl BridgeStats {
    /// Capture statistics from a registry and dispatcher counters
    pub fn capture(registry: &HandleRegistry, dispatcher: DispatcherStats) -> Self {
        let snapshot = registry.snapshot();
        let mut live_by_type = BTreeMap::new();
        let mut live_entries = 0;

        for info in snapshot.iter().filter(|info| info.alive) {
            live_entries += 1;
            *live_by_type.entry(short_type_name(info.type_name)).or_insert(0) += 1;
        }

        Self {
            captured_at: Utc::now(),
            registry_entries: snapshot.len(),
            live_entries,
            dead_entries: snapshot.len() - live_entries,
            live_by_type,
            dispatcher,
        }
    }

    /// Dispatched actions not yet run
    pub fn pending_actions(&self) -> u64 {
        self.dispatcher.pending()
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> DiagnosticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Last path segment of a type name
pub(crate) fn short_type_name(type_name: &str) -> String {
    type_name
        .rsplit("::")
        .next()
        .unwrap_or(type_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trackbridge_core::NativeHandle;

    struct Track;
    struct Sink;

    #[test]
    fn test_capture_counts_live_and_dead() {
        let registry = HandleRegistry::new();
        let a = Arc::new(Track);
        let b = Arc::new(Track);
        let sink = Arc::new(Sink);
        registry.register(NativeHandle::from_raw(0x1000), &a).unwrap();
        registry.register(NativeHandle::from_raw(0x1010), &b).unwrap();
        registry.register(NativeHandle::from_raw(0x1020), &sink).unwrap();
        drop(b);

        let stats = BridgeStats::capture(&registry, DispatcherStats::default());
        assert_eq!(stats.registry_entries, 3);
        assert_eq!(stats.live_entries, 2);
        assert_eq!(stats.dead_entries, 1);
        assert_eq!(stats.live_by_type.get("Track"), Some(&1));
        assert_eq!(stats.live_by_type.get("Sink"), Some(&1));
    }

    #[test]
    fn test_stats_serialize() {
        let registry = HandleRegistry::new();
        let dispatcher = DispatcherStats {
            posted: 5,
            executed: 3,
            dropped: 1,
            panicked: 0,
        };
        let stats = BridgeStats::capture(&registry, dispatcher);
        assert_eq!(stats.pending_actions(), 1);

        let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(json["dispatcher"]["posted"], 5);
        assert!(json["captured_at"].is_string());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("trackbridge_media::track::VideoTrack"), "VideoTrack");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
