//! Runtime counters for the evolution engine.
//!
//! Lock-free `AtomicU64` counters incremented on the hot path and read on
//! export. `tracing` carries the per-event detail; these are the totals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for high-frequency engine events.
#[derive(Debug)]
pub struct NousCounters {
    /// Concepts created since startup.
    pub concepts_created: AtomicU64,
    /// Concept reinforcements since startup.
    pub concepts_reinforced: AtomicU64,
    /// Connections created since startup.
    pub connections_created: AtomicU64,
    /// Connection reinforcements since startup.
    pub connections_reinforced: AtomicU64,
    /// Self-loop edge attempts silently dropped.
    pub self_loops_rejected: AtomicU64,
    /// Interaction patterns recorded.
    pub patterns_recorded: AtomicU64,
    /// Evolution cascades run.
    pub cascades_run: AtomicU64,
    /// Cascade steps skipped because of an error.
    pub cascade_step_failures: AtomicU64,
    /// Extractor failures degraded to zero concepts.
    pub extraction_failures: AtomicU64,
}

impl NousCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            concepts_created: AtomicU64::new(0),
            concepts_reinforced: AtomicU64::new(0),
            connections_created: AtomicU64::new(0),
            connections_reinforced: AtomicU64::new(0),
            self_loops_rejected: AtomicU64::new(0),
            patterns_recorded: AtomicU64::new(0),
            cascades_run: AtomicU64::new(0),
            cascade_step_failures: AtomicU64::new(0),
            extraction_failures: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            concepts_created: self.concepts_created.load(Ordering::Relaxed),
            concepts_reinforced: self.concepts_reinforced.load(Ordering::Relaxed),
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_reinforced: self.connections_reinforced.load(Ordering::Relaxed),
            self_loops_rejected: self.self_loops_rejected.load(Ordering::Relaxed),
            patterns_recorded: self.patterns_recorded.load(Ordering::Relaxed),
            cascades_run: self.cascades_run.load(Ordering::Relaxed),
            cascade_step_failures: self.cascade_step_failures.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for NousCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Concepts created.
    pub concepts_created: u64,
    /// Concept reinforcements.
    pub concepts_reinforced: u64,
    /// Connections created.
    pub connections_created: u64,
    /// Connection reinforcements.
    pub connections_reinforced: u64,
    /// Self-loops dropped.
    pub self_loops_rejected: u64,
    /// Patterns recorded.
    pub patterns_recorded: u64,
    /// Cascades run.
    pub cascades_run: u64,
    /// Cascade steps skipped.
    pub cascade_step_failures: u64,
    /// Extraction failures.
    pub extraction_failures: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 9] = [
            ("nous_concepts_created_total", "Concepts created", self.concepts_created),
            ("nous_concepts_reinforced_total", "Concept reinforcements", self.concepts_reinforced),
            ("nous_connections_created_total", "Connections created", self.connections_created),
            ("nous_connections_reinforced_total", "Connection reinforcements", self.connections_reinforced),
            ("nous_self_loops_rejected_total", "Self-loop edges dropped", self.self_loops_rejected),
            ("nous_patterns_recorded_total", "Interaction patterns recorded", self.patterns_recorded),
            ("nous_cascades_total", "Evolution cascades run", self.cascades_run),
            ("nous_cascade_step_failures_total", "Cascade steps skipped after an error", self.cascade_step_failures),
            ("nous_extraction_failures_total", "Extractor failures", self.extraction_failures),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}
