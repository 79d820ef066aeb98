//! Metrics Collector

use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};

/// Collects and exports metrics for both daemons. Scheduler runs only touch
/// the reconciliation counters, adapter runs only the egress ones.
pub struct Metrics {
    registry: Registry,

    reconcile_ticks_total: IntCounter,
    fetch_failures_total: IntCounter,
    bindings_created_total: IntCounter,
    bindings_deleted_total: IntCounter,
    drains_dropped_total: IntCounter,

    egress_connects_total: IntCounter,
    egress_closes_total: IntCounter,
    active_egress_connections: IntGauge,
    envelopes_forwarded_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let registry = Registry::new();

        let reconcile_ticks_total = IntCounter::new(
            "drainscale_reconcile_ticks_total",
            "Total reconciliation ticks run by the orchestrator",
        )
        .expect("Failed to create reconcile_ticks_total counter");

        let fetch_failures_total = IntCounter::new(
            "drainscale_fetch_failures_total",
            "Total failed fetches of the desired binding set",
        )
        .expect("Failed to create fetch_failures_total counter");

        let bindings_created_total = IntCounter::new(
            "drainscale_bindings_created_total",
            "Total binding create RPCs accepted by adapters",
        )
        .expect("Failed to create bindings_created_total counter");

        let bindings_deleted_total = IntCounter::new(
            "drainscale_bindings_deleted_total",
            "Total binding delete RPCs accepted by adapters",
        )
        .expect("Failed to create bindings_deleted_total counter");

        let drains_dropped_total = IntCounter::new(
            "drainscale_drains_dropped_total",
            "Total drains dropped by the blacklist filter",
        )
        .expect("Failed to create drains_dropped_total counter");

        let egress_connects_total = IntCounter::new(
            "drainscale_egress_connects_total",
            "Total connections opened to the aggregator egress API",
        )
        .expect("Failed to create egress_connects_total counter");

        let egress_closes_total = IntCounter::new(
            "drainscale_egress_closes_total",
            "Total egress connections closed",
        )
        .expect("Failed to create egress_closes_total counter");

        let active_egress_connections = IntGauge::new(
            "drainscale_active_egress_connections",
            "Number of currently held egress connections",
        )
        .expect("Failed to create active_egress_connections gauge");

        let envelopes_forwarded_total = IntCounter::new(
            "drainscale_envelopes_forwarded_total",
            "Total envelopes forwarded to syslog drains",
        )
        .expect("Failed to create envelopes_forwarded_total counter");

        for collector in [
            &reconcile_ticks_total,
            &fetch_failures_total,
            &bindings_created_total,
            &bindings_deleted_total,
            &drains_dropped_total,
            &egress_connects_total,
            &egress_closes_total,
            &envelopes_forwarded_total,
        ] {
            registry
                .register(Box::new(collector.clone()))
                .expect("Failed to register counter");
        }
        registry
            .register(Box::new(active_egress_connections.clone()))
            .expect("Failed to register active_egress_connections");

        Self {
            registry,
            reconcile_ticks_total,
            fetch_failures_total,
            bindings_created_total,
            bindings_deleted_total,
            drains_dropped_total,
            egress_connects_total,
            egress_closes_total,
            active_egress_connections,
            envelopes_forwarded_total,
        }
    }

    pub fn inc_reconcile_ticks(&self) {
        self.reconcile_ticks_total.inc();
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures_total.inc();
    }

    pub fn inc_bindings_created(&self) {
        self.bindings_created_total.inc();
    }

    pub fn inc_bindings_deleted(&self) {
        self.bindings_deleted_total.inc();
    }

    pub fn inc_drains_dropped(&self) {
        self.drains_dropped_total.inc();
    }

    pub fn inc_egress_connects(&self) {
        self.egress_connects_total.inc();
        self.active_egress_connections.inc();
    }

    pub fn inc_egress_closes(&self) {
        self.egress_closes_total.inc();
        self.active_egress_connections.dec();
    }

    pub fn inc_envelopes_forwarded(&self) {
        self.envelopes_forwarded_total.inc();
    }

    pub fn active_egress_connections(&self) -> i64 {
        self.active_egress_connections.get()
    }

    /// Export all metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to encode metrics");
                String::new()
            })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_metrics() {
        let metrics = Metrics::new();
        metrics.inc_reconcile_ticks();
        metrics.inc_egress_connects();

        let exported = metrics.export_prometheus();
        assert!(exported.contains("drainscale_reconcile_ticks_total 1"));
        assert!(exported.contains("drainscale_active_egress_connections 1"));
    }

    #[test]
    fn test_active_connection_gauge_tracks_closes() {
        let metrics = Metrics::new();
        metrics.inc_egress_connects();
        metrics.inc_egress_connects();
        metrics.inc_egress_closes();

        assert_eq!(metrics.active_egress_connections(), 1);
    }
}
