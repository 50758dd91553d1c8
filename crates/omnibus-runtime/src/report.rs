//! Runtime reporting: periodic snapshots of queue depth and unit timing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Appends a section to a shared report buffer.
///
/// `since_last` is the time elapsed since the previous report; when
/// `reset` is true the reporter clears its interval counters (peak queue
/// size, units executed) after appending.
pub trait Reporter: Send {
    fn append_report(&self, buf: &mut String, now: Instant, since_last: Duration, reset: bool);
}

/// Collects registered reporters and concatenates their sections.
pub struct ReportManager {
    reporters: Mutex<Vec<Box<dyn Reporter>>>,
    last: Mutex<Instant>,
}

impl ReportManager {
    pub fn new() -> Self {
        Self {
            reporters: Mutex::new(Vec::new()),
            last: Mutex::new(Instant::now()),
        }
    }

    pub fn register_reporter(&self, reporter: Box<dyn Reporter>) {
        self.reporters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reporter);
    }

    /// Generates a report and resets every reporter's interval counters.
    pub fn generate(&self) -> String {
        self.build(true)
    }

    /// Generates a report without resetting interval counters.
    pub fn snapshot(&self) -> String {
        self.build(false)
    }

    fn build(&self, reset: bool) -> String {
        let now = Instant::now();
        let since_last = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let since = now.duration_since(*last);
            if reset {
                *last = now;
            }
            since
        };
        let mut buf = String::new();
        for reporter in self
            .reporters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            reporter.append_report(&mut buf, now, since_last, reset);
        }
        buf
    }
}

impl Default for ReportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated wall time for one class of unit.
#[derive(Debug, Clone, Default)]
pub struct UnitProfile {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl UnitProfile {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        if elapsed > self.max {
            self.max = elapsed;
        }
    }

    pub fn clear(&mut self) {
        *self = UnitProfile::default();
    }
}

impl fmt::Display for UnitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg = if self.count > 0 {
            self.total / self.count as u32
        } else {
            Duration::ZERO
        };
        write!(
            f,
            "{} units, {}ms avg, {}ms max",
            self.count,
            avg.as_millis(),
            self.max.as_millis()
        )
    }
}

/// Counters shared between a thread loop and its reporter.
#[derive(Default)]
pub(crate) struct LoopStats {
    /// Units executed since the last reset.
    pub units_run: u64,
    /// Largest queue size observed since the last reset.
    pub max_queue_size: usize,
    /// Label of the unit currently running, if any.
    pub current_unit: Option<String>,
    /// When the current unit started.
    pub current_start: Option<Instant>,
    /// Per-unit-class accumulators; populated only when perf tracking is
    /// on.
    pub profiles: HashMap<String, UnitProfile>,
}

impl LoopStats {
    pub fn will_run(&mut self, label: &str, queue_size: usize, start: Instant) {
        if queue_size > self.max_queue_size {
            self.max_queue_size = queue_size;
        }
        self.current_unit = Some(label.to_owned());
        self.current_start = Some(start);
    }

    pub fn did_run(&mut self, label: &str, elapsed: Duration, perf_track: bool) {
        self.units_run += 1;
        self.current_unit = None;
        self.current_start = None;
        if perf_track {
            self.profiles.entry(label.to_owned()).or_default().record(elapsed);
        }
    }
}

/// The reporter both thread loops register: one section in the Java
/// `appendReport` shape, reading the loop's shared stats.
pub(crate) struct LoopReporter {
    pub label: &'static str,
    pub queue_len: Box<dyn Fn() -> usize + Send>,
    pub stats: Arc<Mutex<LoopStats>>,
    pub unit_prof_enabled: bool,
}

impl Reporter for LoopReporter {
    fn append_report(&self, buf: &mut String, now: Instant, _since_last: Duration, reset: bool) {
        use std::fmt::Write as _;

        let qsize = (self.queue_len)();
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        let _ = writeln!(buf, "* {}:", self.label);
        let _ = writeln!(buf, "- Queue size: {qsize}");
        let _ = writeln!(buf, "- Max queue size: {}", stats.max_queue_size);
        let _ = writeln!(buf, "- Units executed: {}", stats.units_run);
        if let (Some(unit), Some(start)) = (&stats.current_unit, stats.current_start) {
            let running = now.saturating_duration_since(start);
            let _ = writeln!(buf, "- Current unit: {unit} {}ms", running.as_millis());
        }
        if self.unit_prof_enabled {
            let mut classes: Vec<_> = stats.profiles.keys().cloned().collect();
            classes.sort();
            for class in classes {
                if let Some(profile) = stats.profiles.get(&class) {
                    let _ = writeln!(buf, "  {class} {profile}");
                }
            }
        }

        if reset {
            stats.max_queue_size = qsize;
            stats.units_run = 0;
            for profile in stats.profiles.values_mut() {
                profile.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_profile_accumulates() {
        let mut profile = UnitProfile::default();
        profile.record(Duration::from_millis(10));
        profile.record(Duration::from_millis(30));
        assert_eq!(profile.count, 2);
        assert_eq!(profile.max, Duration::from_millis(30));
        assert_eq!(profile.to_string(), "2 units, 20ms avg, 30ms max");
        profile.clear();
        assert_eq!(profile.count, 0);
    }

    #[test]
    fn test_loop_reporter_resets_interval_counters() {
        let stats = Arc::new(Mutex::new(LoopStats::default()));
        stats.lock().unwrap().will_run("x", 5, Instant::now());
        stats
            .lock()
            .unwrap()
            .did_run("x", Duration::from_millis(1), true);

        let manager = ReportManager::new();
        manager.register_reporter(Box::new(LoopReporter {
            label: "omnibus.test",
            queue_len: Box::new(|| 0),
            stats: stats.clone(),
            unit_prof_enabled: true,
        }));

        let report = manager.generate();
        assert!(report.contains("* omnibus.test:"));
        assert!(report.contains("- Max queue size: 5"));
        assert!(report.contains("- Units executed: 1"));
        assert!(report.contains("  x 1 units"));

        // Counters were reset by the first generate.
        let report = manager.generate();
        assert!(report.contains("- Max queue size: 0"));
        assert!(report.contains("- Units executed: 0"));
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let stats = Arc::new(Mutex::new(LoopStats::default()));
        stats
            .lock()
            .unwrap()
            .did_run("x", Duration::from_millis(1), false);

        let manager = ReportManager::new();
        manager.register_reporter(Box::new(LoopReporter {
            label: "omnibus.test",
            queue_len: Box::new(|| 0),
            stats,
            unit_prof_enabled: false,
        }));

        assert!(manager.snapshot().contains("- Units executed: 1"));
        assert!(manager.snapshot().contains("- Units executed: 1"));
    }
}
