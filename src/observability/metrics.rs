//! Thread-safe metrics collection
//!
//! Atomic counters for the publish path and the broker connection, plus a
//! serializable snapshot served by the `/metrics` endpoint.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Publish path (atomic for high frequency)
    requests_received: AtomicU64,
    publishes_delivered: AtomicU64,
    publishes_failed: AtomicU64,
    publishes_unavailable: AtomicU64,
    publishes_rejected: AtomicU64,

    // Broker connection
    broker_connected: AtomicBool,
    connect_attempts: AtomicU64,
    connections_established: AtomicU64,
    connect_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Request latencies in milliseconds (mutex protected, bounded)
    latencies: Mutex<Vec<u64>>,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = current_timestamp();

        Self {
            requests_received: AtomicU64::new(0),
            publishes_delivered: AtomicU64::new(0),
            publishes_failed: AtomicU64::new(0),
            publishes_unavailable: AtomicU64::new(0),
            publishes_rejected: AtomicU64::new(0),
            broker_connected: AtomicBool::new(false),
            connect_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(now),
        }
    }

    // Publish path metrics
    pub fn record_request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_success(&self) {
        self.publishes_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publishes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_unavailable(&self) {
        self.publishes_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_latency(&self, duration: Duration) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(duration.as_millis() as u64);

            // Keep the last 1000 measurements to prevent unbounded growth
            if latencies.len() > 1000 {
                latencies.remove(0);
            }
        }
    }

    // Broker connection metrics
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
    }

    pub fn record_connect_success(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.requests_received.store(0, Ordering::Relaxed);
        self.publishes_delivered.store(0, Ordering::Relaxed);
        self.publishes_failed.store(0, Ordering::Relaxed);
        self.publishes_unavailable.store(0, Ordering::Relaxed);
        self.publishes_rejected.store(0, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connect_attempts.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connect_failures.store(0, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
    }

    fn latency_statistics(&self) -> (f64, f64, f64, f64) {
        if let Ok(latencies) = self.latencies.lock() {
            if latencies.is_empty() {
                (0.0, 0.0, 0.0, 0.0)
            } else {
                let mut sorted = latencies.clone();
                sorted.sort_unstable();

                let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
                let p50 = percentile(&sorted, 50.0);
                let p95 = percentile(&sorted, 95.0);
                let p99 = percentile(&sorted, 99.0);

                (avg, p50, p95, p99)
            }
        } else {
            (0.0, 0.0, 0.0, 0.0)
        }
    }

    fn connection_duration(&self, now: u64) -> u64 {
        if self.broker_connected.load(Ordering::Relaxed) {
            let start_time = self.connection_start_time.load(Ordering::Relaxed);
            if start_time > 0 {
                now.saturating_sub(start_time)
            } else {
                0
            }
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_latency_ms, p50, p95, p99) = self.latency_statistics();

        MetricsSnapshot {
            publishes: PublishMetrics {
                requests_received: self.requests_received.load(Ordering::Relaxed),
                delivered: self.publishes_delivered.load(Ordering::Relaxed),
                failed: self.publishes_failed.load(Ordering::Relaxed),
                unavailable: self.publishes_unavailable.load(Ordering::Relaxed),
                rejected: self.publishes_rejected.load(Ordering::Relaxed),
                avg_latency_ms,
                latency_p50_ms: p50,
                latency_p95_ms: p95,
                latency_p99_ms: p99,
            },
            broker: BrokerMetrics {
                connected: self.broker_connected.load(Ordering::Relaxed),
                connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connect_failures: self.connect_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub publishes: PublishMetrics,
    pub broker: BrokerMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct PublishMetrics {
    pub requests_received: u64,
    pub delivered: u64,
    pub failed: u64,
    pub unavailable: u64,
    pub rejected: u64,
    pub avg_latency_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct BrokerMetrics {
    pub connected: bool,
    pub connect_attempts: u64,
    pub connections_established: u64,
    pub connect_failures: u64,
    pub connection_duration_seconds: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_metrics() {
        let collector = MetricsCollector::new();

        collector.record_request_received();
        collector.record_publish_success();
        collector.record_request_latency(Duration::from_millis(120));

        let metrics = collector.get_metrics();
        assert_eq!(metrics.publishes.requests_received, 1);
        assert_eq!(metrics.publishes.delivered, 1);
        assert_eq!(metrics.publishes.failed, 0);
        assert!(metrics.publishes.avg_latency_ms > 100.0);
    }

    #[test]
    fn test_broker_metrics() {
        let collector = MetricsCollector::new();

        collector.record_connect_attempt();
        collector.record_connect_success();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.broker.connect_attempts, 1);
        assert_eq!(metrics.broker.connections_established, 1);
        assert!(metrics.broker.connected);
    }

    #[test]
    fn test_connect_failure_clears_connected_flag() {
        let collector = MetricsCollector::new();

        collector.record_connect_success();
        collector.record_connect_attempt();
        collector.record_connect_failure();

        let metrics = collector.get_metrics();
        assert!(!metrics.broker.connected);
        assert_eq!(metrics.broker.connection_duration_seconds, 0);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let mut handles = vec![];
        for _ in 0..10 {
            let collector_clone = Arc::clone(&collector);
            let handle = thread::spawn(move || {
                for _ in 0..100 {
                    collector_clone.record_request_received();
                    collector_clone.record_publish_success();
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.publishes.requests_received, 1000);
        assert_eq!(metrics.publishes.delivered, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);
        let p0 = percentile(&data, 0.0);
        let p100 = percentile(&data, 100.0);

        assert!((p50 - 5.5).abs() < 0.1, "P50: expected ~5.5, got {p50}");
        assert!((p95 - 9.5).abs() < 0.1, "P95: expected ~9.5, got {p95}");
        assert!((p0 - 1.0).abs() < 0.1, "P0: expected ~1.0, got {p0}");
        assert!(
            (p100 - 10.0).abs() < 0.1,
            "P100: expected ~10.0, got {p100}"
        );

        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_latency_bounds() {
        let collector = MetricsCollector::new();

        // More than the 1000-entry cap
        for i in 0..1500 {
            collector.record_request_latency(Duration::from_millis(i));
        }

        let metrics = collector.get_metrics();
        assert!(metrics.publishes.avg_latency_ms > 0.0);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_request_received();
        collector.record_connect_success();

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.publishes.requests_received, 0);
        assert!(!metrics.broker.connected);
    }
}
