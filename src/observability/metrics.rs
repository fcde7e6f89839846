//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `compute_domain_reconciliations_total` - Total number of ComputeDomain reconciliations
//! - `compute_domain_reconciliation_errors_total` - Total number of reconciliation errors
//! - `compute_domain_reconciliation_duration_seconds` - Duration of reconciliations
//! - `compute_domain_requeues_total` - Requeues by reason
//! - `compute_domain_manager_operations_total` - Derived object manager operations by operation and outcome
//! - `compute_domain_invariant_violations_total` - Owners found bound to more than one DeviceClass
//! - `compute_domain_index_events_total` - Watch events applied to the owner index by kind
//! - `compute_domain_indexed_objects` - Objects currently held by the owner index
//! - `compute_domain_watch_errors_total` - Errors reported by the DeviceClass watch stream

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "compute_domain_reconciliations_total",
        "Total number of ComputeDomain reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "compute_domain_reconciliation_errors_total",
        "Total number of ComputeDomain reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "compute_domain_reconciliation_duration_seconds",
            "Duration of ComputeDomain reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "compute_domain_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static MANAGER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "compute_domain_manager_operations_total",
            "Total number of Derived object manager operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create MANAGER_OPERATIONS_TOTAL metric - this should never happen")
});

static INVARIANT_VIOLATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "compute_domain_invariant_violations_total",
        "Total number of lookups that found more than one DeviceClass for an owner",
    )
    .expect("Failed to create INVARIANT_VIOLATIONS_TOTAL metric - this should never happen")
});

static INDEX_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "compute_domain_index_events_total",
            "Total number of watch events applied to the owner index by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create INDEX_EVENTS_TOTAL metric - this should never happen")
});

static INDEXED_OBJECTS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "compute_domain_indexed_objects",
        "Current number of objects held by the owner index",
    )
    .expect("Failed to create INDEXED_OBJECTS metric - this should never happen")
});

static WATCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "compute_domain_watch_errors_total",
        "Total number of errors reported by the DeviceClass watch stream",
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only if a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MANAGER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVARIANT_VIOLATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INDEX_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INDEXED_OBJECTS.clone()))?;
    REGISTRY.register(Box::new(WATCH_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_manager_operation(operation: &str, outcome: &str) {
    MANAGER_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn increment_invariant_violations() {
    INVARIANT_VIOLATIONS_TOTAL.inc();
}

pub fn increment_index_events(kind: &str) {
    INDEX_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    reason = "Object counts stay far below i64::MAX"
)]
pub fn set_indexed_objects(count: usize) {
    INDEXED_OBJECTS.set(count as i64);
}

pub fn increment_watch_errors() {
    WATCH_ERRORS_TOTAL.inc();
}
