//! Prometheus metrics for the three reconciliation engines (§2 ambient
//! stack).
//!
//! A
//! `lazy_static!` block of `prometheus` vec-metrics registered once at
//! process start, plus small `track_*` helper functions reconcilers call
//! inline rather than touching the metric handles directly. These are
//! pure in-process counters — shipping them anywhere (a scrape endpoint, a
//! push gateway) is out of scope, the same way "dashboards" and
//! "log-shipping backends" are out of scope for the rest of the core.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

lazy_static! {
    /// One reconciliation pass, labeled by which engine ran it.
    pub static ref RECONCILE_PASSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "meridian_reconcile_passes_total",
        "Reconciliation passes completed, by engine",
        &["engine"]
    )
    .unwrap();

    /// Pass duration, labeled the same way.
    pub static ref RECONCILE_PASS_DURATION: HistogramVec = register_histogram_vec!(
        "meridian_reconcile_pass_duration_seconds",
        "Reconciliation pass duration in seconds, by engine",
        &["engine"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .unwrap();

    /// Errors surfaced from a reconciliation pass, by engine and §7 kind.
    pub static ref RECONCILE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "meridian_reconcile_errors_total",
        "Errors surfaced from a reconciliation pass, by engine and error kind",
        &["engine", "kind"]
    )
    .unwrap();

    /// DNS change requests queued with the forwarder, by request kind.
    pub static ref DNS_REQUESTS_QUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "meridian_dns_requests_queued_total",
        "DNS change requests submitted to the name-service forwarder",
        &["request_kind"]
    )
    .unwrap();

    /// Node state transitions, by (from, to) pair (§4.2).
    pub static ref NODE_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "meridian_node_transitions_total",
        "Node lifecycle state transitions, by (from, to) state pair",
        &["from", "to"]
    )
    .unwrap();

    /// Current node count by state — a gauge rather than a counter since
    /// it tracks the live population, not a running total of events.
    pub static ref NODES_BY_STATE: IntGaugeVec = register_int_gauge_vec!(
        "meridian_nodes_by_state",
        "Current number of nodes in each lifecycle state",
        &["state"]
    )
    .unwrap();

    /// Run terminations, by job type and terminal status (§4.4).
    pub static ref RUN_TERMINATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "meridian_run_terminations_total",
        "Pipeline runs that reached a terminal status, by job type and status",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Record one reconciliation pass for `engine`, having taken `duration`
/// and optionally failed with `error_kind` (the §7 kind name, e.g.
/// `"transient"` or `"conflict"`).
pub fn track_pass(engine: &str, duration: std::time::Duration, error_kind: Option<&str>) {
    RECONCILE_PASSES_TOTAL.with_label_values(&[engine]).inc();
    RECONCILE_PASS_DURATION.with_label_values(&[engine]).observe(duration.as_secs_f64());
    if let Some(kind) = error_kind {
        RECONCILE_ERRORS_TOTAL.with_label_values(&[engine, kind]).inc();
    }
}

pub fn track_dns_request(request_kind: &str) {
    DNS_REQUESTS_QUEUED_TOTAL.with_label_values(&[request_kind]).inc();
}

pub fn track_node_transition(from: &str, to: &str) {
    NODE_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
}

pub fn set_nodes_by_state(state: &str, count: i64) {
    NODES_BY_STATE.with_label_values(&[state]).set(count);
}

pub fn track_run_termination(job_type: &str, status: &str) {
    RUN_TERMINATIONS_TOTAL.with_label_values(&[job_type, status]).inc();
}

/// `ControlPlaneError`'s §7 kind name, used as the `kind` label — kept
/// here rather than on the error type itself so the error module stays
/// free of metrics concerns.
pub fn error_kind_label(err: &crate::error::ControlPlaneError) -> &'static str {
    use crate::error::ControlPlaneError::*;
    match err {
        InvariantViolation(_) => "invariant_violation",
        NotFound(_) => "not_found",
        Conflict(_) => "conflict",
        Transient(_) => "transient",
        Permanent(_) => "permanent",
        Capacity(_) => "capacity",
    }
}
