//! Telemetry capability injected into [`crate::ops::VectorOps`].
//!
//! Nothing here is global: the facade holds an `Arc<dyn OperationObserver>`
//! and reports one [`OperationOutcome`] per call. [`NoopObserver`] is the
//! default. Structured logs go through `tracing` regardless of the observer.

#[cfg(feature = "prometheus")]
mod metrics;
#[cfg(feature = "tracing-init")]
mod tracing_init;

use std::time::Duration;

#[cfg(feature = "prometheus")]
pub use metrics::PrometheusObserver;
#[cfg(feature = "tracing-init")]
pub use tracing_init::{TracingError, init_tracing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Error => "error",
        }
    }
}

/// What happened during one facade call.
#[derive(Debug, Clone)]
pub struct OperationOutcome<'a> {
    /// `search`, `insert`, `upsert`, `raw_query`, `admin`, `describe_schema`.
    pub operation: &'a str,
    pub status: OperationStatus,
    pub duration: Duration,
    /// Rows returned or written.
    pub item_count: usize,
    /// Attempts beyond the first.
    pub retries: u64,
}

pub trait OperationObserver: Send + Sync {
    fn record(&self, outcome: &OperationOutcome<'_>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl OperationObserver for NoopObserver {
    fn record(&self, _outcome: &OperationOutcome<'_>) {}
}
