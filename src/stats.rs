//! Reconciliation statistics
//!
//! Counts how many diagnostics were published or dropped (and why), and times each update.
//! Collection is off until enabled through the `bitbake.diagnostics.enableStats` command.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const PUBLISHED: &str = "diagnostics.published";
pub const DROPPED_SOURCE: &str = "diagnostics.dropped.unrecognized_source";
pub const DROPPED_UNMAPPED: &str = "diagnostics.dropped.unmapped";
pub const DROPPED_LANGUAGE: &str = "diagnostics.dropped.language_mismatch";
pub const MESSAGES_REWRITTEN: &str = "diagnostics.messages_rewritten";
pub const UPDATE: &str = "reconcile.update";

#[derive(Clone, Default)]
pub struct ReconcileStats {
    timings: Arc<Mutex<HashMap<String, Vec<Duration>>>>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
    enabled: Arc<AtomicBool>,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            self.reset();
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.timings
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push(duration);
    }

    pub fn increment(&self, counter: &str, amount: u64) {
        if !self.is_enabled() {
            return;
        }
        *self.counters.lock().entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.lock().get(counter).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.timings.lock().clear();
        self.counters.lock().clear();
    }

    pub fn generate_report(&self) -> String {
        let timings = self.timings.lock();
        let counters = self.counters.lock();

        let mut report = String::new();
        let rule = "=".repeat(80);
        let _ = writeln!(report, "{rule}\nBitBake Diagnostics Reconciler Report\n{rule}\n");

        let _ = writeln!(report, "TIMINGS\n{}", "-".repeat(80));
        if timings.is_empty() {
            report.push_str("  No timing data collected\n");
        } else {
            let mut operations: Vec<_> = timings.iter().filter(|(_, t)| !t.is_empty()).collect();
            operations.sort_by_key(|(name, _)| *name);

            for (operation, times) in operations {
                let mut sorted = times.clone();
                sorted.sort();
                let count = sorted.len();
                let total: Duration = sorted.iter().sum();
                let ms = |d: Duration| d.as_secs_f64() * 1000.0;
                let _ = writeln!(report, "\n  {operation}:");
                let _ = writeln!(report, "    Calls:    {count}");
                let _ = writeln!(report, "    Total:    {:.2}ms", ms(total));
                let _ = writeln!(report, "    Avg:      {:.2}ms", ms(total / count as u32));
                let _ = writeln!(report, "    Min:      {:.2}ms", ms(sorted[0]));
                let _ = writeln!(report, "    Max:      {:.2}ms", ms(sorted[count - 1]));
                let _ = writeln!(report, "    P50:      {:.2}ms", ms(sorted[count / 2]));
                let _ = writeln!(report, "    P95:      {:.2}ms", ms(sorted[(count as f64 * 0.95) as usize]));
            }
        }

        let _ = writeln!(report, "\n\nCOUNTERS\n{}", "-".repeat(80));
        if counters.is_empty() {
            report.push_str("  No counter data collected\n");
        } else {
            let mut items: Vec<_> = counters.iter().collect();
            items.sort_by_key(|(name, _)| *name);
            for (name, value) in items {
                let _ = writeln!(report, "  {name}: {value}");
            }
        }

        let _ = writeln!(report, "\n{rule}");
        report
    }
}

/// RAII guard recording the time until it is dropped
pub struct TimingGuard {
    stats: ReconcileStats,
    operation: &'static str,
    start: Instant,
}

impl TimingGuard {
    pub fn new(stats: &ReconcileStats, operation: &'static str) -> Self {
        Self {
            stats: stats.clone(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        self.stats.record(self.operation, self.start.elapsed());
    }
}
