//! Prometheus metrics for connection groups
//!
//! Exposed through [`Metrics::gather`]; serving them is up to the host.

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::OnceLock;

use crate::health::MonitorState;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// dbcluster metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Probe results by instance
    pub probes_total: IntCounterVec,
    /// Rebuild attempts by instance and outcome
    pub rebuilds_total: IntCounterVec,
    /// Monitor state per instance (0 = healthy, 1 = rebuilding)
    pub monitor_state: IntGaugeVec,
    /// Instances currently in the registry
    pub groups: IntGauge,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let probes_total = IntCounterVec::new(
            Opts::new("dbcluster_probes_total", "Total number of liveness probes"),
            &["instance", "result"], // success, failure, missing
        )
        .unwrap();

        let rebuilds_total = IntCounterVec::new(
            Opts::new(
                "dbcluster_rebuilds_total",
                "Total number of group rebuild attempts",
            ),
            &["instance", "result"], // success, failure, config_error
        )
        .unwrap();

        let monitor_state = IntGaugeVec::new(
            Opts::new(
                "dbcluster_monitor_state",
                "Health monitor state (0 = healthy, 1 = rebuilding)",
            ),
            &["instance"],
        )
        .unwrap();

        let groups = IntGauge::new("dbcluster_groups", "Number of registered groups").unwrap();

        registry.register(Box::new(probes_total.clone())).unwrap();
        registry.register(Box::new(rebuilds_total.clone())).unwrap();
        registry.register(Box::new(monitor_state.clone())).unwrap();
        registry.register(Box::new(groups.clone())).unwrap();

        Self {
            registry,
            probes_total,
            rebuilds_total,
            monitor_state,
            groups,
        }
    }

    /// Record a probe result
    pub fn record_probe(&self, instance: &str, result: &str) {
        self.probes_total
            .with_label_values(&[instance, result])
            .inc();
    }

    /// Record a rebuild attempt
    pub fn record_rebuild(&self, instance: &str, result: &str) {
        self.rebuilds_total
            .with_label_values(&[instance, result])
            .inc();
    }

    pub fn set_monitor_state(&self, instance: &str, state: MonitorState) {
        self.monitor_state
            .with_label_values(&[instance])
            .set(state.as_gauge());
    }

    pub fn set_groups(&self, count: usize) {
        self.groups.set(count as i64);
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
