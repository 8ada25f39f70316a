//! Prometheus metrics for the divert engine.
//!
//! Tracks directive synchronization, shim decisions and audited rule matches.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Directives currently installed in the filtering backend
    pub static ref DIRECTIVES_INSTALLED: Gauge = register_gauge!(
        "divert_directives_installed",
        "Number of directives installed in the filtering backend"
    )
    .unwrap();

    /// Rules left out of the directive set
    pub static ref COMPILE_SKIPPED_TOTAL: CounterVec = register_counter_vec!(
        "divert_compile_skipped_total",
        "Total number of rules skipped while compiling directives",
        &["reason"]  // reason: invalid_id|duplicate_id|empty_match|malformed_action|...
    )
    .unwrap();

    /// Snapshot synchronizations
    pub static ref SYNC_TOTAL: CounterVec = register_counter_vec!(
        "divert_sync_total",
        "Total number of rule snapshot synchronizations",
        &["result"]  // result: success|error
    )
    .unwrap();

    /// Decisions taken by the runtime shim
    pub static ref SHIM_DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "divert_shim_decisions_total",
        "Total number of intercepted calls by outcome",
        &["surface", "outcome"]  // surface: fetch|xhr, outcome: pass|block|mock|modify
    )
    .unwrap();

    /// Delay consumed before dispatch
    pub static ref SHIM_DELAY_MS: HistogramVec = register_histogram_vec!(
        "divert_shim_delay_ms",
        "Histogram of delays applied by the runtime shim in milliseconds",
        &["surface"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();

    /// Matches written to the audit log
    pub static ref RULE_MATCHES_TOTAL: CounterVec = register_counter_vec!(
        "divert_rule_matches_total",
        "Total number of rule matches recorded in the audit log",
        &["rule_type"]  // rule_type: block|redirect|headers|mock|intercept|unknown
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn set_directives_installed(count: usize) {
    DIRECTIVES_INSTALLED.set(count as f64);
}

pub fn record_compile_skip(reason: &str) {
    COMPILE_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_sync(success: bool) {
    let result = if success { "success" } else { "error" };
    SYNC_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_shim_decision(surface: &str, outcome: &str) {
    SHIM_DECISIONS_TOTAL
        .with_label_values(&[surface, outcome])
        .inc();
}

pub fn record_shim_delay(surface: &str, delay_ms: u64) {
    SHIM_DELAY_MS
        .with_label_values(&[surface])
        .observe(delay_ms as f64);
}

pub fn record_rule_match(rule_type: &str) {
    RULE_MATCHES_TOTAL.with_label_values(&[rule_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        set_directives_installed(3);
        record_sync(true);
        record_compile_skip("invalid_regex");

        let metrics = collect_metrics();

        assert!(metrics.contains("divert_directives_installed"));
        assert!(metrics.contains("divert_sync_total"));
        assert!(metrics.contains("divert_compile_skipped_total"));
    }

    #[test]
    fn test_shim_metrics() {
        record_shim_decision("fetch", "mock");
        record_shim_decision("xhr", "block");
        record_shim_delay("fetch", 250);
        record_rule_match("redirect");

        let metrics = collect_metrics();
        assert!(metrics.contains("divert_shim_decisions_total"));
        assert!(metrics.contains("divert_shim_delay_ms"));
        assert!(metrics.contains("divert_rule_matches_total"));
    }
}
