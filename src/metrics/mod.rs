//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming and helper recorders for
//! connector calls, jobs and persistence outcomes.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Prospecta metrics
pub const METRICS_PREFIX: &str = "prospecta";

/// Buckets for connector latency (external APIs, typically slow)
pub const CONNECTOR_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_connector_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total external connector invocations"
    );

    describe_counter!(
        format!("{}_connector_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total failed connector invocations"
    );

    describe_histogram!(
        format!("{}_connector_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Connector call latency in seconds"
    );

    describe_counter!(
        format!("{}_connector_cost_micros_total", METRICS_PREFIX),
        Unit::Count,
        "Accumulated connector spend in micro-USD"
    );

    describe_counter!(
        format!("{}_jobs_enqueued_total", METRICS_PREFIX),
        Unit::Count,
        "Enrichment jobs enqueued"
    );

    describe_counter!(
        format!("{}_jobs_finished_total", METRICS_PREFIX),
        Unit::Count,
        "Enrichment jobs that reached a terminal state, by status"
    );

    describe_histogram!(
        format!("{}_job_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end enrichment job duration"
    );

    describe_counter!(
        format!("{}_entities_persisted_total", METRICS_PREFIX),
        Unit::Count,
        "Entities inserted, by kind"
    );

    describe_counter!(
        format!("{}_entities_deduplicated_total", METRICS_PREFIX),
        Unit::Count,
        "Inserts skipped by the identity-hash constraint, by kind"
    );

    describe_counter!(
        format!("{}_budget_denials_total", METRICS_PREFIX),
        Unit::Count,
        "Generator calls blocked by the project budget ceiling"
    );

    describe_gauge!(
        format!("{}_queue_pending", METRICS_PREFIX),
        Unit::Count,
        "Jobs waiting for dispatch"
    );

    describe_gauge!(
        format!("{}_jobs_running", METRICS_PREFIX),
        Unit::Count,
        "Jobs currently executing"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time and record one connector call
pub struct ConnectorCallTimer {
    start: Instant,
    service: String,
}

impl ConnectorCallTimer {
    pub fn start(service: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record call completion; returns the latency for the audit record
    pub fn finish(self, success: bool) -> u64 {
        let elapsed = self.start.elapsed();
        let status = if success { "success" } else { "error" };

        counter!(
            format!("{}_connector_calls_total", METRICS_PREFIX),
            "service" => self.service.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_connector_duration_seconds", METRICS_PREFIX),
            "service" => self.service.clone()
        )
        .record(elapsed.as_secs_f64());

        if !success {
            counter!(
                format!("{}_connector_errors_total", METRICS_PREFIX),
                "service" => self.service
            )
            .increment(1);
        }

        elapsed.as_millis() as u64
    }
}

/// Record connector spend
pub fn record_cost(service: &str, cost_micros: u64) {
    counter!(
        format!("{}_connector_cost_micros_total", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .increment(cost_micros);
}

/// Record a job entering the queue
pub fn record_job_enqueued() {
    counter!(format!("{}_jobs_enqueued_total", METRICS_PREFIX)).increment(1);
}

/// Record a job reaching a terminal state
pub fn record_job_finished(status: &str, duration_secs: f64) {
    counter!(
        format!("{}_jobs_finished_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(format!("{}_job_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record a persistence outcome
pub fn record_persist(kind: &str, deduplicated: bool) {
    if deduplicated {
        counter!(
            format!("{}_entities_deduplicated_total", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_entities_persisted_total", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .increment(1);
    }
}

/// Record a budget denial
pub fn record_budget_denial() {
    counter!(format!("{}_budget_denials_total", METRICS_PREFIX)).increment(1);
}

/// Update queue depth gauges
pub fn record_queue_depth(pending: usize, running: usize) {
    gauge!(format!("{}_queue_pending", METRICS_PREFIX)).set(pending as f64);
    gauge!(format!("{}_jobs_running", METRICS_PREFIX)).set(running as f64);
}
