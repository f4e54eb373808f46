//! Metrics instrumentation for cluster-dns.
//!
//! All metrics are prefixed with `cluster_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a resolver query.
pub fn record_query(kind: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::Malformed => "malformed",
    };

    counter!("cluster_dns.query.count", "kind" => kind.to_string(), "result" => result_str)
        .increment(1);
    histogram!("cluster_dns.query.duration.seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records.
    Success,
    /// Name not found.
    NxDomain,
    /// Query name failed parsing.
    Malformed,
}

/// Record a reconciler event.
pub fn record_event(kind: ObjectKind, op: EventOp, outcome: EventOutcome) {
    let kind_str = match kind {
        ObjectKind::Service => "service",
        ObjectKind::Endpoints => "endpoints",
        ObjectKind::Node => "node",
    };
    let op_str = match op {
        EventOp::Add => "add",
        EventOp::Update => "update",
        EventOp::Delete => "delete",
    };
    let outcome_str = match outcome {
        EventOutcome::Applied => "applied",
        EventOutcome::Skipped => "skipped",
        EventOutcome::Rejected => "rejected",
    };

    counter!("cluster_dns.reconcile.event.count",
        "kind" => kind_str, "op" => op_str, "outcome" => outcome_str)
    .increment(1);
}

/// Object kinds flowing through the event sinks.
#[derive(Debug, Clone, Copy)]
pub enum ObjectKind {
    /// Service objects.
    Service,
    /// Endpoints objects.
    Endpoints,
    /// Node objects.
    Node,
}

/// Event operations.
#[derive(Debug, Clone, Copy)]
pub enum EventOp {
    /// Object added.
    Add,
    /// Object updated.
    Update,
    /// Object deleted.
    Delete,
}

/// What the reconciler did with an event.
#[derive(Debug, Clone, Copy)]
pub enum EventOutcome {
    /// State was mutated.
    Applied,
    /// Event carried no work (e.g. endpoints of a non-headless service).
    Skipped,
    /// Object failed classification and was dropped.
    Rejected,
}

/// Record a configuration snapshot application.
pub fn record_config_apply(accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    counter!("cluster_dns.config.apply.count", "result" => result).increment(1);
}

/// Record state counts (called periodically and on change).
pub fn record_state_counts(services: usize, endpoints: usize, reverse_entries: usize) {
    gauge!("cluster_dns.state.services.count").set(services as f64);
    gauge!("cluster_dns.state.endpoints.count").set(endpoints as f64);
    gauge!("cluster_dns.state.reverse_entries.count").set(reverse_entries as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
