//! LatencyMonitor (C6) — per-operation bounded ring of `(timestamp,
//! duration)` samples, with on-demand percentiles and threshold alerts.
//!
//! Grounded on `health_check::LatencyTracker` (`add_sample` / sort-and-index
//! percentile calculation) generalized to per-operation keying.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;

use crate::types::{Alert, AlertSeverity, AlertType};

struct Ring {
    samples: VecDeque<(u64, Duration)>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Ring { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, timestamp_ns: u64, duration: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp_ns, duration));
    }

    fn avg(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().map(|(_, d)| *d).sum();
        total / self.samples.len() as u32
    }

    fn percentile(&self, p: f64) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().map(|(_, d)| *d).collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OperationThreshold {
    pub p95: Duration,
    pub p99: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct OperationMetrics {
    pub avg: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub sample_count: usize,
}

pub struct LatencyMonitor {
    rings: RwLock<HashMap<String, Ring>>,
    thresholds: RwLock<HashMap<String, OperationThreshold>>,
    ring_capacity: usize,
}

impl LatencyMonitor {
    pub fn new(ring_capacity: usize) -> Self {
        LatencyMonitor {
            rings: RwLock::new(HashMap::new()),
            thresholds: RwLock::new(HashMap::new()),
            ring_capacity,
        }
    }

    pub fn register_threshold(&self, op: impl Into<String>, threshold: OperationThreshold) {
        self.thresholds.write().insert(op.into(), threshold);
    }

    pub fn record(&self, op: &str, timestamp_ns: u64, duration: Duration) {
        let mut rings = self.rings.write();
        rings
            .entry(op.to_string())
            .or_insert_with(|| Ring::new(self.ring_capacity))
            .push(timestamp_ns, duration);
    }

    pub fn avg(&self, op: &str) -> Duration {
        self.rings.read().get(op).map(Ring::avg).unwrap_or(Duration::ZERO)
    }

    pub fn p95(&self, op: &str) -> Duration {
        self.rings
            .read()
            .get(op)
            .map(|r| r.percentile(0.95))
            .unwrap_or(Duration::ZERO)
    }

    pub fn p99(&self, op: &str) -> Duration {
        self.rings
            .read()
            .get(op)
            .map(|r| r.percentile(0.99))
            .unwrap_or(Duration::ZERO)
    }

    pub fn get_metrics(&self) -> HashMap<String, OperationMetrics> {
        let rings = self.rings.read();
        rings
            .iter()
            .map(|(op, ring)| {
                (
                    op.clone(),
                    OperationMetrics {
                        avg: ring.avg(),
                        p95: ring.percentile(0.95),
                        p99: ring.percentile(0.99),
                        sample_count: ring.samples.len(),
                    },
                )
            })
            .collect()
    }

    /// Emits an alert per registered operation whose current p95 or p99
    /// exceeds its configured bound.
    pub fn check_thresholds(&self, now_ns: u64) -> Vec<Alert> {
        let thresholds = self.thresholds.read();
        let rings = self.rings.read();
        let mut alerts = Vec::new();

        for (op, threshold) in thresholds.iter() {
            let Some(ring) = rings.get(op) else { continue };
            let p95 = ring.percentile(0.95);
            let p99 = ring.percentile(0.99);
            if p99 > threshold.p99 {
                alerts.push(make_alert(op, "p99", p99, threshold.p99, now_ns));
            } else if p95 > threshold.p95 {
                alerts.push(make_alert(op, "p95", p95, threshold.p95, now_ns));
            }
        }
        alerts
    }
}

fn make_alert(op: &str, metric: &str, observed: Duration, bound: Duration, now_ns: u64) -> Alert {
    let mut details = HashMap::new();
    details.insert("operation".to_string(), op.to_string());
    details.insert("metric".to_string(), metric.to_string());
    details.insert("observed_ms".to_string(), observed.as_millis().to_string());
    details.insert("threshold_ms".to_string(), bound.as_millis().to_string());

    Alert {
        id: uuid::Uuid::new_v4().to_string(),
        alert_type: AlertType::Latency,
        severity: AlertSeverity::Warning,
        message: format!("{op} {metric} latency {observed:?} exceeds threshold {bound:?}"),
        details,
        created_at_ns: now_ns,
        acknowledged_at_ns: None,
        resolved_at_ns: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_computed_on_sorted_window() {
        let monitor = LatencyMonitor::new(100);
        for i in 1..=100u64 {
            monitor.record("sim", i, Duration::from_millis(i));
        }
        assert_eq!(monitor.p95("sim"), Duration::from_millis(95));
        assert_eq!(monitor.p99("sim"), Duration::from_millis(99));
    }

    #[test]
    fn threshold_breach_emits_alert() {
        let monitor = LatencyMonitor::new(100);
        monitor.register_threshold(
            "sim",
            OperationThreshold {
                p95: Duration::from_millis(10),
                p99: Duration::from_millis(20),
            },
        );
        for i in 1..=100u64 {
            monitor.record("sim", i, Duration::from_millis(50));
        }
        let alerts = monitor.check_thresholds(1000);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Latency);
    }

    #[test]
    fn ring_evicts_oldest_sample() {
        let monitor = LatencyMonitor::new(2);
        monitor.record("op", 1, Duration::from_millis(1));
        monitor.record("op", 2, Duration::from_millis(2));
        monitor.record("op", 3, Duration::from_millis(3));
        let metrics = monitor.get_metrics();
        assert_eq!(metrics["op"].sample_count, 2);
    }
}
