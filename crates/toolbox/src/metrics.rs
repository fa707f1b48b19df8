use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TOOL_INVOCATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "toolbox_tool_invocations_total",
            "Total number of tool invocations by tool and outcome."
        ),
        &["tool", "outcome"]
    )
    .expect("valid tool invocation metric");
    pub static ref FALLBACK_QUERIES_TOTAL: IntCounter = IntCounter::new(
        "toolbox_fallback_queries_total",
        "Total number of raw queries run through the fallback path."
    )
    .expect("valid fallback query metric");
}

/// Register the toolbox collectors with [`REGISTRY`]; safe to call more than once
pub fn register_metrics() {
    // AlreadyReg on repeat calls is expected
    let _ = REGISTRY.register(Box::new(TOOL_INVOCATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FALLBACK_QUERIES_TOTAL.clone()));
}

pub fn record_invocation(tool: &str, outcome: &str) {
    TOOL_INVOCATIONS_TOTAL.with_label_values(&[tool, outcome]).inc();
}

/// Gather metrics for exposition
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_counters() {
        register_metrics();
        register_metrics();
        record_invocation("search-hotel-by-id", "success");
        FALLBACK_QUERIES_TOTAL.inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("toolbox_tool_invocations_total"));
        assert!(text.contains("tool=\"search-hotel-by-id\""));
        assert!(text.contains("toolbox_fallback_queries_total"));
    }
}
