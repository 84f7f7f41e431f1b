//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `sops_operator_reconciliations_total` - Total number of reconciliations
//! - `sops_operator_reconciliation_errors_total` - Reconciliations that ended in a failure status or error
//! - `sops_operator_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `sops_operator_secrets_applied_total` - Secret writes by operation (created, updated, unchanged)
//! - `sops_operator_decryption_total` - Total number of sops invocations
//! - `sops_operator_decryption_errors_total` - Failed sops invocations by failure reason
//! - `sops_operator_decryption_duration_seconds` - Duration of sops invocations
//! - `sops_operator_status_write_errors_total` - Failed `SopsSecret` status writes
//! - `sops_operator_requeues_total` - Requeues by reason (backoff, status_write, load_error, watch_error)

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sops_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SECRETS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_operator_secrets_applied_total",
            "Total number of Secret apply operations by result",
        ),
        &["operation"],
    )
    .expect("Failed to create SECRETS_APPLIED_TOTAL metric - this should never happen")
});

static DECRYPTION_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_operator_decryption_total",
        "Total number of SOPS decryption operations",
    )
    .expect("Failed to create DECRYPTION_TOTAL metric - this should never happen")
});

static DECRYPTION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_operator_decryption_errors_total",
            "Total number of SOPS decryption errors by failure reason",
        ),
        &["reason"],
    )
    .expect("Failed to create DECRYPTION_ERRORS_TOTAL metric - this should never happen")
});

static DECRYPTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sops_operator_decryption_duration_seconds",
            "Duration of SOPS decryption operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create DECRYPTION_DURATION metric - this should never happen")
});

static STATUS_WRITE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_operator_status_write_errors_total",
        "Total number of failed SopsSecret status writes",
    )
    .expect("Failed to create STATUS_WRITE_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRETS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPTION_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPTION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

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

/// Record a Secret apply (`created`, `updated`, `unchanged`)
pub fn increment_secrets_applied(operation: &str) {
    SECRETS_APPLIED_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_decryption_total() {
    DECRYPTION_TOTAL.inc();
}

/// Record a failed decryption with its classified reason
pub fn increment_decryption_errors(reason: &str) {
    DECRYPTION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_decryption_duration(duration: f64) {
    DECRYPTION_DURATION.observe(duration);
}

pub fn increment_status_write_errors() {
    STATUS_WRITE_ERRORS_TOTAL.inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
