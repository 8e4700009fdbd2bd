//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Best-effort metric events.
pub mod metrics;

pub use metrics::{InMemoryMetricsSink, MetricRecord, MetricsSink, NoopMetricsSink, TracingMetricsSink};
