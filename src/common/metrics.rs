//! Per-operation metrics, exported in Prometheus text format
//!
//! Each remote operation records one call, whether the call failed
//! (before projection to the legacy `false` / empty result), and its
//! latency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 9] = [0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0];

/// Fixed-bucket latency histogram
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: &'static [f64],
    /// Sum in microseconds
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: (0..=LATENCY_BUCKETS.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: &LATENCY_BUCKETS,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        let idx = self
            .boundaries
            .iter()
            .position(|&b| millis <= b)
            .unwrap_or(self.boundaries.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative (upper bound, count) pairs, ending with +Inf
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0u64;
        let mut out = Vec::with_capacity(self.buckets.len());
        for (i, bucket) in self.buckets.iter().enumerate() {
            running += bucket.load(Ordering::Relaxed);
            let bound = self.boundaries.get(i).copied().unwrap_or(f64::INFINITY);
            out.push((bound, running));
        }
        out
    }

    pub fn sum_millis(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for one remote operation
#[derive(Debug, Default)]
pub struct OperationMetrics {
    pub calls: AtomicU64,
    pub failures: AtomicU64,
    pub latency: Histogram,
}

/// Registry of per-operation metrics
#[derive(Debug)]
pub struct MetricsRegistry {
    operations: Mutex<BTreeMap<&'static str, Arc<OperationMetrics>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    fn operation(&self, name: &'static str) -> Arc<OperationMetrics> {
        match self.operations.lock() {
            Ok(mut ops) => ops.entry(name).or_default().clone(),
            // a poisoned registry only loses samples
            Err(_) => Arc::new(OperationMetrics::default()),
        }
    }

    /// Record a finished call
    pub fn record(&self, name: &'static str, started: Instant, ok: bool) {
        let op = self.operation(name);
        op.calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            op.failures.fetch_add(1, Ordering::Relaxed);
        }
        op.latency.observe(started.elapsed());
    }

    pub fn calls(&self, name: &'static str) -> u64 {
        self.operation(name).calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self, name: &'static str) -> u64 {
        self.operation(name).failures.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        out += "# HELP backupdir_uptime_seconds Time since the directory started\n";
        out += "# TYPE backupdir_uptime_seconds gauge\n";
        out += &format!("backupdir_uptime_seconds {}\n", self.uptime().as_secs());

        let ops: Vec<(&'static str, Arc<OperationMetrics>)> = match self.operations.lock() {
            Ok(ops) => ops.iter().map(|(k, v)| (*k, v.clone())).collect(),
            Err(_) => Vec::new(),
        };

        out += "# TYPE backupdir_calls_total counter\n";
        for (name, op) in &ops {
            out += &format!(
                "backupdir_calls_total{{operation=\"{}\"}} {}\n",
                name,
                op.calls.load(Ordering::Relaxed)
            );
        }
        out += "# TYPE backupdir_failures_total counter\n";
        for (name, op) in &ops {
            out += &format!(
                "backupdir_failures_total{{operation=\"{}\"}} {}\n",
                name,
                op.failures.load(Ordering::Relaxed)
            );
        }
        out += "# TYPE backupdir_call_duration_ms histogram\n";
        for (name, op) in &ops {
            for (bound, count) in op.latency.cumulative() {
                let le = if bound.is_infinite() {
                    "+Inf".to_string()
                } else {
                    bound.to_string()
                };
                out += &format!(
                    "backupdir_call_duration_ms_bucket{{operation=\"{}\",le=\"{}\"}} {}\n",
                    name, le, count
                );
            }
            out += &format!(
                "backupdir_call_duration_ms_sum{{operation=\"{}\"}} {}\n",
                name,
                op.latency.sum_millis()
            );
            out += &format!(
                "backupdir_call_duration_ms_count{{operation=\"{}\"}} {}\n",
                name,
                op.latency.count()
            );
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let h = Histogram::new();
        h.observe(Duration::from_micros(300));
        h.observe(Duration::from_millis(7));
        h.observe(Duration::from_secs(2));

        let buckets = h.cumulative();
        assert_eq!(buckets[0], (0.5, 1));
        assert_eq!(buckets.last().unwrap().1, 3);
        assert!(buckets.last().unwrap().0.is_infinite());
        assert_eq!(h.count(), 3);
    }

    #[test]
    fn test_registry_counts() {
        let registry = MetricsRegistry::new();
        let now = Instant::now();
        registry.record("next_server", now, true);
        registry.record("next_server", now, false);
        registry.record("create_account", now, true);

        assert_eq!(registry.calls("next_server"), 2);
        assert_eq!(registry.failures("next_server"), 1);
        assert_eq!(registry.failures("create_account"), 0);

        let text = registry.to_prometheus();
        assert!(text.contains("backupdir_calls_total{operation=\"next_server\"} 2"));
        assert!(text.contains("backupdir_failures_total{operation=\"next_server\"} 1"));
        assert!(text.contains("le=\"+Inf\""));
    }
}
