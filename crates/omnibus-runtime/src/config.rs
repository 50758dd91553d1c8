//! Runtime configuration and the subscribe access policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use omnibus_object::DObject;

/// Configuration for an Omnibus runtime.
///
/// This is the exhaustive option set; anything else the embedding system
/// wants to tune lives outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Track per-unit wall time on both threads. Adds a mutex touch per
    /// item, so it defaults off.
    pub perf_track: bool,

    /// Include the per-unit-class breakdown in reports. Only meaningful
    /// together with `perf_track`.
    pub unit_prof_enabled: bool,

    /// How many times the shutdown sentinel may cross between the two
    /// threads before shutdown is forced.
    pub shutdown_max_passes: u32,

    /// How many times the sentinel may re-queue on the same thread before
    /// shutdown is forced.
    pub shutdown_max_loops: u32,

    /// How often a report is generated and logged. Zero means on demand
    /// only.
    pub report_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            perf_track: false,
            unit_prof_enabled: false,
            shutdown_max_passes: 50,
            shutdown_max_loops: 10_000,
            report_interval: Duration::ZERO,
        }
    }
}

impl RuntimeConfig {
    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically when the runtime spawns. A zero pass or loop
    /// bound would force shutdown before the sentinel ever ran, so both
    /// are raised to one.
    pub fn validated(mut self) -> Self {
        if self.shutdown_max_passes == 0 {
            warn!("shutdown_max_passes of 0 would never quiesce cleanly — raising to 1");
            self.shutdown_max_passes = 1;
        }
        if self.shutdown_max_loops == 0 {
            warn!("shutdown_max_loops of 0 would never quiesce cleanly — raising to 1");
            self.shutdown_max_loops = 1;
        }
        self
    }
}

/// Decides whether a subscriber may attach to an object.
///
/// Supplied by the embedding system and called on the manager thread, so
/// implementations must not block.
pub trait AccessPolicy: Send {
    fn allow_subscribe(&self, object: &DObject) -> bool;
}

/// The default policy: every subscribe request is allowed.
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn allow_subscribe(&self, _object: &DObject) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_documented_values() {
        let config = RuntimeConfig::default();
        assert!(!config.perf_track);
        assert!(!config.unit_prof_enabled);
        assert_eq!(config.shutdown_max_passes, 50);
        assert_eq!(config.shutdown_max_loops, 10_000);
        assert_eq!(config.report_interval, Duration::ZERO);
    }

    #[test]
    fn test_validated_raises_zero_bounds() {
        let config = RuntimeConfig {
            shutdown_max_passes: 0,
            shutdown_max_loops: 0,
            ..RuntimeConfig::default()
        }
        .validated();
        assert_eq!(config.shutdown_max_passes, 1);
        assert_eq!(config.shutdown_max_loops, 1);
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = RuntimeConfig {
            perf_track: true,
            report_interval: Duration::from_secs(30),
            ..RuntimeConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let decoded: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert!(decoded.perf_track);
        assert_eq!(decoded.report_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_allow_all_allows() {
        let obj = DObject::new("anything");
        assert!(AllowAll.allow_subscribe(&obj));
    }
}
