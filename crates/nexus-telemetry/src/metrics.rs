//! Prometheus metrics for Nexus buses and bridges.
//!
//! All metrics follow the naming convention: `nexus_<component>_<metric>_<unit>`
//! and are labelled by bus (or bridge) id so several buses in one process
//! stay distinguishable.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Envelopes accepted by middleware and recorded
    pub static ref EVENTS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_events_published_total", "Envelopes published"),
        &["bus"]
    ).expect("metric creation failed");

    /// Envelopes vetoed by middleware
    pub static ref EVENTS_BLOCKED: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_events_blocked_total", "Envelopes vetoed by middleware"),
        &["bus"]
    ).expect("metric creation failed");

    /// Handler invocations scheduled
    pub static ref HANDLER_DISPATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_handler_dispatches_total", "Handler invocations scheduled"),
        &["bus"]
    ).expect("metric creation failed");

    /// Handler failures (errors and panics)
    pub static ref HANDLER_FAULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_handler_faults_total", "Handler errors and panics"),
        &["bus"]
    ).expect("metric creation failed");

    /// Middleware failures (treated as pass-through)
    pub static ref MIDDLEWARE_FAULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_middleware_faults_total", "Middleware errors and panics"),
        &["bus"]
    ).expect("metric creation failed");

    /// Requests that got no correlated reply in time
    pub static ref REQUEST_TIMEOUTS: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bus_request_timeouts_total", "Requests without a reply before the deadline"),
        &["bus"]
    ).expect("metric creation failed");

    /// Request round-trip latency for answered requests
    pub static ref REQUEST_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "nexus_bus_request_duration_seconds",
            "Time from request publish to correlated reply"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("valid buckets")),
        &["bus"]
    ).expect("metric creation failed");

    /// Current number of retained history entries
    pub static ref HISTORY_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("nexus_bus_history_entries", "Entries currently retained in the history ring"),
        &["bus"]
    ).expect("metric creation failed");

    // =========================================================================
    // BRIDGE METRICS
    // =========================================================================

    /// Envelopes forwarded, per bridge rule
    pub static ref BRIDGE_FORWARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bridge_forwarded_total", "Envelopes forwarded across a bridge"),
        &["bridge", "rule"]
    ).expect("metric creation failed");

    /// Already-bridged envelopes that matched a rule and were dropped
    pub static ref BRIDGE_LOOPS_PREVENTED: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_bridge_loops_prevented_total", "Bridged envelopes not re-forwarded"),
        &["bridge"]
    ).expect("metric creation failed");
}

/// Handle returned once metrics are registered
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// # Errors
///
/// `TelemetryError::MetricsInit` if a metric is already registered.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bus
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_BLOCKED.clone()),
        Box::new(HANDLER_DISPATCHES.clone()),
        Box::new(HANDLER_FAULTS.clone()),
        Box::new(MIDDLEWARE_FAULTS.clone()),
        Box::new(REQUEST_TIMEOUTS.clone()),
        Box::new(REQUEST_LATENCY.clone()),
        Box::new(HISTORY_SIZE.clone()),
        // Bridge
        Box::new(BRIDGE_FORWARDED.clone()),
        Box::new(BRIDGE_LOOPS_PREVENTED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
///
/// # Errors
///
/// `TelemetryError::MetricsInit` if encoding fails.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // May fail if another test registered first, which is fine
        let _ = register_metrics();
    }

    #[test]
    fn test_counter_increment() {
        EVENTS_PUBLISHED.with_label_values(&["TEST"]).inc();
        assert!(EVENTS_PUBLISHED.with_label_values(&["TEST"]).get() >= 1);
    }

    #[test]
    fn test_gauge_set() {
        HISTORY_SIZE.with_label_values(&["GAUGE"]).set(42);
        assert_eq!(HISTORY_SIZE.with_label_values(&["GAUGE"]).get(), 42);
    }

    #[test]
    fn test_histogram_observe() {
        REQUEST_LATENCY.with_label_values(&["LATENCY"]).observe(0.002);
        assert_eq!(REQUEST_LATENCY.with_label_values(&["LATENCY"]).get_sample_count(), 1);
    }

    #[test]
    fn test_encode_metrics_after_register() {
        let _ = register_metrics();
        BRIDGE_LOOPS_PREVENTED.with_label_values(&["ENCODE"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("nexus_bridge_loops_prevented_total"));
    }
}
