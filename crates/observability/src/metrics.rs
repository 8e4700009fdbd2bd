//! Metric sinks.
//!
//! The engine reports one structured record per chunk outcome and per job.
//! Sinks are best-effort: they never fail the caller.

use std::sync::Mutex;

use serde_json::Value;

/// Target used by [`TracingMetricsSink`].
pub const METRICS_TARGET: &str = "chunkflow::metrics";

pub trait MetricsSink: Send + Sync {
    /// Record `event` with its `fields` (a JSON object).
    fn persist(&self, event: &str, fields: Value);
}

impl<S> MetricsSink for std::sync::Arc<S>
where
    S: MetricsSink + ?Sized,
{
    fn persist(&self, event: &str, fields: Value) {
        (**self).persist(event, fields)
    }
}

/// Emits each metric as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn persist(&self, event: &str, fields: Value) {
        tracing::info!(target: METRICS_TARGET, metric = event, fields = %fields);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn persist(&self, _event: &str, _fields: Value) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub event: String,
    pub fields: Value,
}

/// Keeps every record in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records whose event name equals `event`.
    pub fn named(&self, event: &str) -> Vec<MetricRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn persist(&self, event: &str, fields: Value) {
        // Poisoned lock: drop the record, metrics are best-effort.
        if let Ok(mut records) = self.records.lock() {
            records.push(MetricRecord {
                event: event.to_string(),
                fields,
            });
        }
    }
}
