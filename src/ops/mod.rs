//! Operation facade over the codec, builder and pool layers.
//!
//! [`VectorOps`] is the entry point for hosts. Each operation resolves its
//! request against [`OperationDefaults`], validates everything it can before
//! touching a connection, executes through a shared [`VectorPool`] and reports
//! one outcome to the injected [`OperationObserver`].

mod admin;
mod error;
mod query;
mod request;
mod search;
mod write;

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

pub use error::{ErrorKind, ErrorReport, OpsError, OpsResult};
pub use request::{
    AdminAction, AdminRequest, AdminResponse, ColumnInfo, OneOrMany, RawQueryRequest,
    RecordInput, SchemaRequest, SchemaResponse, SearchRequest, TableInfo, WriteRequest,
    WriteResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::{Config, ConnectionOverrides, OperationDefaults, PostgresConfig, RetryConfig},
    db::{PoolHealth, PoolRegistry, ScopedSettings, VectorPool},
    observability::{NoopObserver, OperationObserver, OperationOutcome, OperationStatus},
    sql::QueryError,
    vector,
};

/// Operation names accepted by [`VectorOps::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Search,
    Insert,
    Upsert,
    RawQuery,
    Admin,
    DescribeSchema,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Insert => "insert",
            Operation::Upsert => "upsert",
            Operation::RawQuery => "raw_query",
            Operation::Admin => "admin",
            Operation::DescribeSchema => "describe_schema",
        }
    }
}

/// Result of an operation plus what the observer needs to know about it.
struct Observed<T> {
    value: T,
    item_count: usize,
    attempts: u32,
}

/// Vector operations against PostgreSQL + pgvector.
pub struct VectorOps {
    database: PostgresConfig,
    defaults: OperationDefaults,
    retry: RetryConfig,
    pools: PoolRegistry,
    observer: Arc<dyn OperationObserver>,
    /// Probes stored by the `set-probes` admin action. 0 means unset.
    probes: AtomicU32,
}

impl std::fmt::Debug for VectorOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorOps")
            .field("database", &self.database)
            .field("defaults", &self.defaults)
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}

impl VectorOps {
    /// Validate `config` and build the facade. No connection is opened until
    /// the first operation runs.
    pub fn new(config: Config) -> OpsResult<Self> {
        config.validate()?;
        Ok(Self {
            pools: PoolRegistry::new(config.retry.clone()),
            database: config.database,
            defaults: config.defaults,
            retry: config.retry,
            observer: Arc::new(NoopObserver),
            probes: AtomicU32::new(0),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn defaults(&self) -> &OperationDefaults {
        &self.defaults
    }

    /// Dispatch a JSON request by operation name and return a JSON result.
    pub async fn call(&self, operation: Operation, request: Value) -> OpsResult<Value> {
        let value = match operation {
            Operation::Search => {
                serde_json::to_value(self.search(serde_json::from_value(request)?).await?)?
            }
            Operation::Insert => {
                serde_json::to_value(self.insert(serde_json::from_value(request)?).await?)?
            }
            Operation::Upsert => {
                serde_json::to_value(self.upsert(serde_json::from_value(request)?).await?)?
            }
            Operation::RawQuery => {
                serde_json::to_value(self.raw_query(serde_json::from_value(request)?).await?)?
            }
            Operation::Admin => {
                serde_json::to_value(self.admin(serde_json::from_value(request)?).await?)?
            }
            Operation::DescribeSchema => serde_json::to_value(
                self.describe_schema(serde_json::from_value(request)?).await?,
            )?,
        };
        Ok(value)
    }

    /// Probe the backend selected by `overrides`. Never fails.
    pub async fn test_connection(&self, overrides: &ConnectionOverrides, timeout: Duration) -> bool {
        match self.pool(overrides) {
            Ok(pool) => pool.test_connection(timeout).await,
            Err(_) => false,
        }
    }

    /// Health of the pool serving `overrides`.
    pub fn health(&self, overrides: &ConnectionOverrides) -> OpsResult<PoolHealth> {
        Ok(self.pool(overrides)?.health())
    }

    /// Close every pool. Later operations open new ones.
    pub async fn close(&self) {
        self.pools.close_all().await;
    }

    fn pool(&self, overrides: &ConnectionOverrides) -> OpsResult<Arc<VectorPool>> {
        let config = self.database.merged(overrides);
        Ok(self.pools.get_or_create(&config)?)
    }

    pub(crate) fn stored_probes(&self) -> Option<u32> {
        match self.probes.load(Ordering::Relaxed) {
            0 => None,
            probes => Some(probes),
        }
    }

    /// Request value, else the configured default, else a missing-field error.
    fn resolve_name(
        &self,
        requested: Option<String>,
        default: Option<&String>,
        field: &str,
    ) -> OpsResult<String> {
        requested
            .or_else(|| default.cloned())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                QueryError::missing(
                    field,
                    format!(
                        "set `{field}` on the request or `defaults.{field}` in the configuration"
                    ),
                )
                .into()
            })
    }

    /// Decode, check and optionally normalize one embedding.
    fn prepare_vector(
        &self,
        input: &Value,
        normalize: Option<bool>,
        dimension: Option<usize>,
        hint: &str,
    ) -> OpsResult<Vec<f64>> {
        let parsed = vector::parse(input)?.ok_or_else(|| QueryError::missing("vector", hint))?;
        let checked = vector::validate_dimension(parsed, dimension.or(self.defaults.dimension))?;
        if normalize.unwrap_or(self.defaults.normalize) {
            Ok(vector::normalize(&checked))
        } else {
            Ok(checked)
        }
    }

    fn timeout_settings(timeout_ms: Option<u64>) -> ScopedSettings {
        ScopedSettings::with_statement_timeout(timeout_ms.map(Duration::from_millis))
    }

    /// Run one operation, then log and report its outcome.
    async fn observe<T, Fut>(&self, operation: Operation, work: Fut) -> OpsResult<T>
    where
        Fut: Future<Output = OpsResult<Observed<T>>>,
    {
        let start = Instant::now();
        let result = work.await;
        let duration = start.elapsed();
        let duration_ms = duration.as_millis() as u64;

        let (status, item_count, retries) = match &result {
            Ok(observed) => {
                info!(
                    stage = "vector_operation_completed",
                    backend = "pgvector",
                    operation = operation.as_str(),
                    status = "success",
                    duration_ms = duration_ms,
                    item_count = observed.item_count,
                    attempts = observed.attempts,
                    "Vector operation completed"
                );
                (
                    OperationStatus::Success,
                    observed.item_count,
                    u64::from(observed.attempts.saturating_sub(1)),
                )
            }
            Err(error) => {
                warn!(
                    stage = "vector_operation_completed",
                    backend = "pgvector",
                    operation = operation.as_str(),
                    status = "error",
                    error_kind = ?error.kind(),
                    code = ?error.code(),
                    duration_ms = duration_ms,
                    error = %error,
                    "Vector operation failed"
                );
                // A retryable error at this level means every attempt was used.
                let retries = if error.kind() == ErrorKind::Transient {
                    u64::from(self.retry.max_attempts().saturating_sub(1))
                } else {
                    0
                };
                (OperationStatus::Error, 0, retries)
            }
        };

        self.observer.record(&OperationOutcome {
            operation: operation.as_str(),
            status,
            duration,
            item_count,
            retries,
        });

        result.map(|observed| observed.value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingObserver {
        outcomes: Mutex<Vec<(String, OperationStatus, usize, u64)>>,
    }

    impl OperationObserver for RecordingObserver {
        fn record(&self, outcome: &OperationOutcome<'_>) {
            self.outcomes.lock().unwrap().push((
                outcome.operation.to_string(),
                outcome.status,
                outcome.item_count,
                outcome.retries,
            ));
        }
    }

    fn ops_with_defaults(defaults: OperationDefaults) -> VectorOps {
        VectorOps::new(Config {
            defaults,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.database.port = 0;
        let err = VectorOps::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_resolve_name_precedence() {
        let ops = ops_with_defaults(OperationDefaults {
            table: Some("documents".into()),
            ..Default::default()
        });
        let default = ops.defaults.table.clone();

        assert_eq!(
            ops.resolve_name(Some("items".into()), default.as_ref(), "table")
                .unwrap(),
            "items"
        );
        assert_eq!(
            ops.resolve_name(None, default.as_ref(), "table").unwrap(),
            "documents"
        );

        let err = ops.resolve_name(None, None, "column").unwrap_err();
        assert!(matches!(
            err,
            OpsError::Query(QueryError::MissingRequiredField { .. })
        ));
        assert!(err.to_string().contains("defaults.column"));
    }

    #[test]
    fn test_prepare_vector_pipeline() {
        let ops = ops_with_defaults(OperationDefaults {
            dimension: Some(2),
            ..Default::default()
        });

        let v = ops
            .prepare_vector(&json!("3,4"), Some(true), None, "hint")
            .unwrap();
        assert!((v[0] - 0.6).abs() < 1e-12);
        assert!((v[1] - 0.8).abs() < 1e-12);

        // Request dimension overrides the default
        let v = ops
            .prepare_vector(&json!([1, 2, 3]), None, Some(3), "hint")
            .unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);

        let err = ops
            .prepare_vector(&json!([1, 2, 3]), None, None, "hint")
            .unwrap_err();
        assert!(err.to_string().contains('3') && err.to_string().contains('2'));

        let err = ops
            .prepare_vector(&Value::Null, None, None, "send `vector`")
            .unwrap_err();
        assert!(err.to_string().contains("vector"));
        assert!(err.to_string().contains("send `vector`"));
    }

    #[test]
    fn test_default_normalize_applies() {
        let ops = ops_with_defaults(OperationDefaults {
            normalize: true,
            ..Default::default()
        });
        let v = ops.prepare_vector(&json!([0, 5]), None, None, "").unwrap();
        assert_eq!(v, vec![0.0, 1.0]);
        let v = ops
            .prepare_vector(&json!([0, 5]), Some(false), None, "")
            .unwrap();
        assert_eq!(v, vec![0.0, 5.0]);
    }

    #[tokio::test]
    async fn test_validation_errors_reach_observer_without_pool() {
        let observer = Arc::new(RecordingObserver::default());
        let ops = VectorOps::new(Config::default())
            .unwrap()
            .with_observer(observer.clone());

        let err = ops
            .search(SearchRequest {
                table: Some("items".into()),
                column: Some("embedding".into()),
                vector: json!("not-a-vector"),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpsError::Vector(vector::VectorError::UnsupportedFormat { .. })
        ));
        assert!(ops.pools.is_empty());

        let outcomes = observer.outcomes.lock().unwrap();
        assert_eq!(
            *outcomes,
            vec![("search".to_string(), OperationStatus::Error, 0, 0)]
        );
    }

    #[tokio::test]
    async fn test_call_rejects_malformed_payload() {
        let ops = VectorOps::new(Config::default()).unwrap();
        let err = ops
            .call(Operation::Admin, json!({"action": "truncate"}))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::InvalidRequest(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_operation_names() {
        let op: Operation = serde_json::from_value(json!("describe_schema")).unwrap();
        assert_eq!(op, Operation::DescribeSchema);
        assert_eq!(Operation::RawQuery.as_str(), "raw_query");
    }
}
