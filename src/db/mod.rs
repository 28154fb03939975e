//! Connection pool client for PostgreSQL + pgvector.
//!
//! [`VectorPool`] owns the connection lifecycle. Every statement reaches the
//! backend through [`VectorPool::with_scoped_connection`], which releases the
//! connection on every exit path, and retries go through [`retry::with_retry`]
//! with one fresh acquisition per attempt so no connection is held across a
//! backoff sleep.

mod error;
mod metrics;
mod registry;
pub mod retry;
mod rows;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

pub use error::{
    DbError, DbResult, ErrorClass, classify_error, is_connection_terminated, is_host_not_found,
};
use futures::{TryStreamExt, future::BoxFuture};
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
pub use registry::PoolRegistry;
pub use rows::row_to_json;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{
    Connection, Either, Executor, PgConnection, PgPool, Postgres,
    pool::PoolConnection,
    postgres::{PgArguments, PgPoolOptions},
    query::Query,
};
use tracing::{debug, info, warn};

use crate::{
    config::{PostgresConfig, RetryConfig},
    sql::{SqlParam, Statement},
};

#[cfg(test)]
pub(crate) use error::tests::db_error;

/// Upper bound on how long [`VectorPool::close`] waits for checked-out connections.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows and affected-row count of one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub rows: Vec<Map<String, Value>>,
    pub row_count: u64,
    /// Attempts it took, including the successful one.
    #[serde(skip)]
    pub attempts: u32,
}

/// Session settings applied to a scoped connection and reset before release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedSettings {
    /// Per-statement timeout. Zero disables the server-side limit.
    pub statement_timeout: Option<Duration>,
    /// `ivfflat.probes`.
    pub probes: Option<u32>,
    /// `hnsw.ef_search`.
    pub ef_search: Option<u32>,
}

impl ScopedSettings {
    pub fn with_statement_timeout(timeout: Option<Duration>) -> Self {
        Self {
            statement_timeout: timeout,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statement_timeout.is_none() && self.probes.is_none() && self.ef_search.is_none()
    }

    fn parameters(&self) -> Vec<(&'static str, u128)> {
        let mut parameters = Vec::with_capacity(3);
        if let Some(timeout) = self.statement_timeout {
            parameters.push(("statement_timeout", timeout.as_millis()));
        }
        if let Some(probes) = self.probes {
            parameters.push(("ivfflat.probes", probes.into()));
        }
        if let Some(ef_search) = self.ef_search {
            parameters.push(("hnsw.ef_search", ef_search.into()));
        }
        parameters
    }

    fn set_sql(&self) -> String {
        self.parameters()
            .into_iter()
            .map(|(name, value)| format!("SET {name} = {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn reset_sql(&self) -> String {
        self.parameters()
            .into_iter()
            .map(|(name, _)| format!("RESET {name}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Snapshot of pool occupancy and counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
    pub closed: bool,
    pub metrics: PoolMetricsSnapshot,
}

/// A bounded PostgreSQL pool with retry and scoped-connection guarantees.
pub struct VectorPool {
    pool: PgPool,
    config: PostgresConfig,
    retry: RetryConfig,
    metrics: Arc<PoolMetrics>,
    closed: AtomicBool,
}

impl std::fmt::Debug for VectorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorPool")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl VectorPool {
    /// Validate `config` and build a pool.
    ///
    /// Connections are opened on first use, so construction never blocks on
    /// the network; an invalid configuration fails here instead.
    pub fn connect(config: &PostgresConfig, retry: RetryConfig) -> DbResult<Self> {
        config.validate()?;
        retry.validate()?;

        let metrics = Arc::new(PoolMetrics::default());
        let opened = metrics.clone();

        // Idle connections are pinged before reuse so a connection the server
        // dropped while idle is discarded instead of failing the next caller.
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .test_before_acquire(true)
            .after_connect(move |_conn, meta| {
                let opened = opened.clone();
                Box::pin(async move {
                    opened.record_connection_opened();
                    debug!(
                        stage = "connection_opened",
                        age_ms = meta.age.as_millis() as u64,
                        "Opened database connection"
                    );
                    Ok(())
                })
            })
            .connect_lazy_with(config.connect_options());

        info!(
            stage = "pool_created",
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "Created pgvector connection pool"
        );

        Ok(Self {
            pool,
            config: config.clone(),
            retry,
            metrics,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.pool.is_closed()
    }

    pub fn health(&self) -> PoolHealth {
        PoolHealth {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.config.max_connections,
            closed: self.is_closed(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Run `f` on one pooled connection.
    ///
    /// `settings` are applied before `f` and reset afterwards. The connection
    /// goes back to the pool on every exit path; if the reset cannot run
    /// (failure or cancellation) it is closed instead so no session state
    /// leaks to the next caller.
    pub async fn with_scoped_connection<T, F>(
        &self,
        settings: &ScopedSettings,
        f: F,
    ) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::Closed);
        }

        let mut scoped = ScopedConnection {
            conn: self.acquire().await?,
            dirty: !settings.is_empty(),
        };

        if scoped.dirty {
            scoped.connection().execute(settings.set_sql().as_str()).await?;
        }

        let result = f(scoped.connection()).await;

        if scoped.dirty {
            match scoped.connection().execute(settings.reset_sql().as_str()).await {
                Ok(_) => scoped.dirty = false,
                Err(error) => warn!(
                    stage = "session_reset_failed",
                    error = %error,
                    "Discarding connection after failed session reset"
                ),
            }
        }
        drop(scoped);

        result.map_err(DbError::from)
    }

    /// Check out a connection.
    ///
    /// sqlx retries a failing connect inside `acquire` until the acquire
    /// timeout and then reports only `PoolTimedOut`. When the pool holds no
    /// connection at all, one direct connect recovers the backend's own error
    /// (refused, DNS, authentication).
    async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        match self.pool.acquire().await {
            Err(sqlx::Error::PoolTimedOut) if self.pool.size() == 0 => {
                let connect_options = self.config.connect_options();
                let direct = PgConnection::connect_with(&connect_options);
                match tokio::time::timeout(self.config.acquire_timeout(), direct).await {
                    Ok(Err(error)) => {
                        debug!(
                            stage = "connect_diagnosed",
                            error = %error,
                            "Pool could not open a connection"
                        );
                        Err(error)
                    }
                    Ok(Ok(conn)) => {
                        let _ = conn.close().await;
                        Err(sqlx::Error::PoolTimedOut)
                    }
                    Err(_) => Err(sqlx::Error::PoolTimedOut),
                }
            }
            other => other,
        }
    }

    /// Execute one statement, retrying transient failures.
    ///
    /// After exhaustion or on a fatal error the last backend error is
    /// returned unchanged.
    pub async fn execute_with_retry(
        &self,
        statement: &Statement,
        settings: &ScopedSettings,
        operation: &str,
    ) -> DbResult<QueryOutput> {
        let attempt = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry::with_retry(&self.retry, operation, DbError::is_retryable, || {
            self.begin_attempt(&attempt);
            let statement = statement.clone();
            self.with_scoped_connection(settings, move |conn| {
                Box::pin(async move { run_statement(conn, &statement).await })
            })
        })
        .await
        .map(|mut output| {
            output.attempts = attempt.load(Ordering::Relaxed);
            output
        });

        self.finish(operation, &attempt, start, &result);
        result
    }

    /// Execute statements in one transaction on one connection.
    ///
    /// A failed statement rolls the whole batch back, so the batch is retried
    /// as a unit.
    pub async fn execute_batch_with_retry(
        &self,
        statements: &[Statement],
        settings: &ScopedSettings,
        operation: &str,
    ) -> DbResult<Vec<QueryOutput>> {
        let attempt = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry::with_retry(&self.retry, operation, DbError::is_retryable, || {
            self.begin_attempt(&attempt);
            let statements = statements.to_vec();
            self.with_scoped_connection(settings, move |conn| {
                Box::pin(async move { run_batch(conn, &statements).await })
            })
        })
        .await
        .map(|mut outputs| {
            let attempts = attempt.load(Ordering::Relaxed);
            outputs.iter_mut().for_each(|output| output.attempts = attempts);
            outputs
        });

        self.finish(operation, &attempt, start, &result);
        result
    }

    /// Best-effort probe. Errors and timeouts report `false`.
    pub async fn test_connection(&self, timeout: Duration) -> bool {
        let settings = ScopedSettings::default();
        let probe = self.with_scoped_connection(&settings, |conn| {
            Box::pin(async move { conn.ping().await })
        });

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                debug!(stage = "connection_test_failed", error = %error, "Connection test failed");
                false
            }
            Err(_) => {
                debug!(
                    stage = "connection_test_timed_out",
                    timeout_ms = timeout.as_millis() as u64,
                    "Connection test timed out"
                );
                false
            }
        }
    }

    /// Close the pool. Idempotent; waits at most [`CLOSE_TIMEOUT`].
    pub async fn close(&self) -> DbResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, self.pool.close()).await {
            Ok(()) => {
                info!(
                    stage = "pool_closed",
                    host = %self.config.host,
                    database = %self.config.database,
                    "Closed pgvector connection pool"
                );
                Ok(())
            }
            Err(_) => {
                warn!(
                    stage = "pool_close_timed_out",
                    timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                    "Timed out waiting for connections to be returned"
                );
                Err(DbError::CloseTimedOut(CLOSE_TIMEOUT))
            }
        }
    }

    fn begin_attempt(&self, attempt: &AtomicU32) {
        if attempt.fetch_add(1, Ordering::Relaxed) > 0 {
            self.metrics.record_retry();
        }
        self.metrics.record_attempt();
    }

    fn finish<T>(&self, operation: &str, attempt: &AtomicU32, start: Instant, result: &DbResult<T>) {
        let attempts = attempt.load(Ordering::Relaxed);
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(_) => {
                self.metrics.record_success();
                debug!(
                    stage = "statement_executed",
                    operation = operation,
                    attempts = attempts,
                    duration_ms = duration_ms,
                    "Statement executed"
                );
            }
            Err(error) => {
                self.metrics.record_failure();
                debug!(
                    stage = "statement_failed",
                    operation = operation,
                    attempts = attempts,
                    duration_ms = duration_ms,
                    error = %error,
                    "Statement failed"
                );
            }
        }
    }
}

/// Close a pool if there is one. Safe to call repeatedly.
pub async fn close_pool(pool: Option<&VectorPool>) -> DbResult<()> {
    match pool {
        Some(pool) => pool.close().await,
        None => Ok(()),
    }
}

/// A checked-out connection that is closed instead of returned to the pool
/// if it is dropped while session settings are still applied.
struct ScopedConnection {
    conn: PoolConnection<Postgres>,
    dirty: bool,
}

impl ScopedConnection {
    fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if self.dirty {
            self.conn.close_on_drop();
        }
    }
}

async fn run_statement(
    conn: &mut PgConnection,
    statement: &Statement,
) -> Result<QueryOutput, sqlx::Error> {
    let query = bind_params(sqlx::query(&statement.text), &statement.params);
    let mut stream = conn.fetch_many(query);

    let mut output = QueryOutput::default();
    let mut rows_affected = 0;
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => rows_affected += done.rows_affected(),
            Either::Right(row) => output.rows.push(row_to_json(&row)?),
        }
    }
    output.row_count = rows_affected.max(output.rows.len() as u64);
    Ok(output)
}

async fn run_batch(
    conn: &mut PgConnection,
    statements: &[Statement],
) -> Result<Vec<QueryOutput>, sqlx::Error> {
    let mut tx = conn.begin().await?;
    let mut outputs = Vec::with_capacity(statements.len());

    for statement in statements {
        match run_statement(&mut tx, statement).await {
            Ok(output) => outputs.push(output),
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Rollback after failed batch statement failed");
                }
                return Err(error);
            }
        }
    }

    tx.commit().await?;
    Ok(outputs)
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(value) => query.bind(*value),
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Float(value) => query.bind(*value),
            SqlParam::Text(value) => query.bind(value.as_str()),
            SqlParam::Json(value) => query.bind(sqlx::types::Json(value)),
        };
    }
    query
}
