//! Prometheus metrics for the thumbnail stores
//!
//! Counters are process-wide, like the stores' backing files; every
//! registry in the process reports into the same families.

use prometheus::{
    core::{AtomicI64, GenericGauge},
    Encoder, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Once;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Metrics registry for this crate
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref READS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("minithumb_reads_total", "Total thumbnail reads"),
        &["result"]
    ).unwrap();

    pub static ref WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("minithumb_writes_total", "Total thumbnail writes"),
        &["result"]
    ).unwrap();

    pub static ref OPEN_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("minithumb_open_failures_total", "Backing files that could not be opened"),
        &["file"]
    ).unwrap();

    pub static ref ACTIVE_STORES: GenericGauge<AtomicI64> = GenericGauge::new(
        "minithumb_active_stores",
        "Number of stores held by registries"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metric families (idempotent)
pub fn init_metrics() {
    INIT.call_once(|| {
        METRICS_REGISTRY.register(Box::new(READS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(WRITES_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(OPEN_FAILURES.clone())).ok();
        METRICS_REGISTRY.register(Box::new(ACTIVE_STORES.clone())).ok();
        info!("Metrics initialized");
    });
}

/// Outcome label for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Hit,
    Miss,
    Fault,
}

impl ReadResult {
    fn label(self) -> &'static str {
        match self {
            ReadResult::Hit => "hit",
            ReadResult::Miss => "miss",
            ReadResult::Fault => "fault",
        }
    }
}

/// Outcome label for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Stored,
    Rejected,
    Skipped,
    Fault,
}

impl WriteResult {
    fn label(self) -> &'static str {
        match self {
            WriteResult::Stored => "stored",
            WriteResult::Rejected => "rejected",
            WriteResult::Skipped => "skipped",
            WriteResult::Fault => "fault",
        }
    }
}

pub fn record_read(result: ReadResult) {
    READS_TOTAL.with_label_values(&[result.label()]).inc();
}

pub fn record_write(result: WriteResult) {
    WRITES_TOTAL.with_label_values(&[result.label()]).inc();
}

pub fn record_open_failure(file: &str) {
    OPEN_FAILURES.with_label_values(&[file]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    init_metrics();
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_read_counts() {
        init_metrics();
        let before = READS_TOTAL.with_label_values(&["miss"]).get();
        record_read(ReadResult::Miss);
        assert!(READS_TOTAL.with_label_values(&["miss"]).get() > before);
    }

    #[test]
    fn test_export_metrics() {
        record_write(WriteResult::Stored);
        let output = export_metrics();
        assert!(output.contains("minithumb_writes_total"));
    }
}
