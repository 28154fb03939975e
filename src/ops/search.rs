use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{Observed, Operation, OpsResult, SearchRequest, VectorOps};
use crate::{
    db::ScopedSettings,
    sql::{QuerySpec, SimilarityMetric, build_similarity_query},
};

impl VectorOps {
    /// Nearest-neighbor search.
    ///
    /// Rows come back ordered by ascending distance, each with a
    /// `similarity` column holding the distance to the query vector.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "search"))]
    pub async fn search(&self, request: SearchRequest) -> OpsResult<Vec<Map<String, Value>>> {
        self.observe(Operation::Search, self.run_search(request))
            .await
    }

    async fn run_search(
        &self,
        request: SearchRequest,
    ) -> OpsResult<Observed<Vec<Map<String, Value>>>> {
        let vector = self.prepare_vector(
            &request.vector,
            request.normalize,
            request.dimension,
            "set `vector` to the query embedding",
        )?;

        let metric = match request.metric.as_deref() {
            Some(name) => SimilarityMetric::from_name(Some(name)),
            None => self.defaults.metric,
        };

        let spec = QuerySpec {
            table: request.table.or_else(|| self.defaults.table.clone()),
            column: request.column.or_else(|| self.defaults.column.clone()),
            vector,
            metric,
            limit: request.limit.or(self.defaults.limit),
            filter: request.filter,
            where_clause: request.where_clause,
            select: request.select,
        };
        let statement = build_similarity_query(&spec)?;

        let settings = ScopedSettings {
            statement_timeout: Self::timeout_settings(request.timeout_ms).statement_timeout,
            probes: request
                .probes
                .or_else(|| self.stored_probes())
                .or(self.defaults.probes),
            ef_search: request.ef_search.or(self.defaults.ef_search),
        };

        debug!(
            stage = "vector_operation_started",
            backend = "pgvector",
            operation = "search",
            metric = metric.as_str(),
            dimension = spec.vector.len(),
            filters = spec.filter.len(),
            "Starting vector search operation"
        );

        let pool = self.pool(&request.connection)?;
        let output = pool
            .execute_with_retry(&statement, &settings, Operation::Search.as_str())
            .await?;

        Ok(Observed {
            item_count: output.rows.len(),
            attempts: output.attempts,
            value: output.rows,
        })
    }
}
