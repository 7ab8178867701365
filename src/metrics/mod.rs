//! Prometheus Metrics
//!
//! Process-wide counters for the scan and reconcile paths, exposed by the
//! `/metrics` endpoint of the binary.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{Error, Result};

static RECONCILE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dt_node_labeller_reconcile_total",
        "Total number of node label reconciliations by result",
        &["result"]
    )
    .expect("reconcile counter registration")
});

static DISCOVERED_IDENTIFIERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "dt_node_labeller_discovered_identifiers",
        "Number of distinct compatible identifiers found by the last scan"
    )
    .expect("identifier gauge registration")
});

static DESIRED_LABELS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "dt_node_labeller_desired_labels",
        "Number of labels the labeller maintains on its node"
    )
    .expect("label gauge registration")
});

/// Outcome label values for [`record_reconcile`]
pub mod result {
    pub const UPDATED: &str = "updated";
    pub const NODE_MISSING: &str = "node_missing";
    pub const CONFLICT: &str = "conflict";
    pub const ERROR: &str = "error";
}

pub fn record_reconcile(result: &str) {
    RECONCILE_TOTAL.with_label_values(&[result]).inc();
}

pub fn reconcile_count(result: &str) -> u64 {
    RECONCILE_TOTAL.with_label_values(&[result]).get()
}

pub fn set_discovered_identifiers(count: usize) {
    DISCOVERED_IDENTIFIERS.set(count as i64);
}

pub fn set_desired_labels(count: usize) {
    DESIRED_LABELS.set(count as i64);
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather() -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((encoder.format_type().to_string(), buffer))
}
