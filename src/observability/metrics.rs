//! Prometheus-style metrics through the `metrics` facade.
//!
//! Recording is a no-op until the host installs a `metrics` recorder
//! (for example `metrics-exporter-prometheus`).

use metrics::{counter, histogram};

use super::{OperationObserver, OperationOutcome};

/// Records every facade operation as `metrics` counters and histograms:
///
/// * `pgvector_operations_total{operation, status}`
/// * `pgvector_operation_duration_seconds{operation}`
/// * `pgvector_operation_items{operation}`
/// * `pgvector_retries_total{operation}`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusObserver;

impl OperationObserver for PrometheusObserver {
    fn record(&self, outcome: &OperationOutcome<'_>) {
        counter!(
            "pgvector_operations_total",
            "operation" => outcome.operation.to_string(),
            "status" => outcome.status.as_str()
        )
        .increment(1);

        histogram!(
            "pgvector_operation_duration_seconds",
            "operation" => outcome.operation.to_string()
        )
        .record(outcome.duration.as_secs_f64());

        histogram!(
            "pgvector_operation_items",
            "operation" => outcome.operation.to_string()
        )
        .record(outcome.item_count as f64);

        if outcome.retries > 0 {
            counter!(
                "pgvector_retries_total",
                "operation" => outcome.operation.to_string()
            )
            .increment(outcome.retries);
        }
    }
}
