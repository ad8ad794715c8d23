//! Metrics for message sends and exporter setup
//!
//! # Metrics
//!
//! - `pipeline_sends_total`: Counter of finished sends by outcome
//! - `pipeline_send_duration_seconds`: Histogram of send duration by outcome
//! - `pipeline_sends_in_flight`: Gauge of sends currently running
//! - `pipeline_retries_total`: Counter of retried attempts
//! - `proxy_requests_total`: Counter of proxy responses by status
//! - `proxy_rate_limited_total`: Counter of requests rejected by the rate limiter
//! - `proxy_fallback_total`: Counter of fallback replies by reason
//! - `store_degraded_writes_total`: Counter of writes saved by the degradation policy
//!
//! # Examples
//!
//! ```
//! use tutorchat::metrics::SendMetrics;
//!
//! let metrics = SendMetrics::start();
//! metrics.record("succeeded");
//! ```

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for a single message send
///
/// Increments the in-flight gauge on creation; recording an outcome (or
/// dropping the tracker) decrements it exactly once.
#[derive(Debug)]
pub struct SendMetrics {
    start: Instant,
    recorded: AtomicBool,
}

impl SendMetrics {
    /// Begin tracking a send
    pub fn start() -> Self {
        increment_gauge!("pipeline_sends_in_flight", 1.0);
        Self {
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Record how the send ended; later calls are ignored
    ///
    /// # Arguments
    ///
    /// * `outcome` - One of "rejected", "succeeded", "failed", "cancelled"
    pub fn record(&self, outcome: &'static str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "pipeline_send_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "outcome" => outcome
        );
        increment_counter!("pipeline_sends_total", "outcome" => outcome);
        decrement_gauge!("pipeline_sends_in_flight", 1.0);
    }

    /// Whether an outcome has been recorded
    pub fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }

    /// Time since the send started
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for SendMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("pipeline_sends_in_flight", 1.0);
        }
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// When the `prometheus` feature is enabled, this installs the Prometheus
/// exporter with its default listener. Otherwise it does nothing and is
/// still safe to call.
///
/// # Examples
///
/// ```
/// use tutorchat::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
