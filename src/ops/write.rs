use tracing::{debug, instrument};

use super::{Observed, Operation, OpsResult, VectorOps, WriteRequest, WriteResponse};
use crate::sql::{QueryError, Statement, build_insert, build_upsert};

impl VectorOps {
    /// Insert one or more records in a single transaction.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "insert"))]
    pub async fn insert(&self, request: WriteRequest) -> OpsResult<WriteResponse> {
        self.observe(Operation::Insert, self.run_write(request, Operation::Insert))
            .await
    }

    /// Insert or replace records keyed by the id column.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "upsert"))]
    pub async fn upsert(&self, request: WriteRequest) -> OpsResult<WriteResponse> {
        self.observe(Operation::Upsert, self.run_write(request, Operation::Upsert))
            .await
    }

    async fn run_write(
        &self,
        request: WriteRequest,
        operation: Operation,
    ) -> OpsResult<Observed<WriteResponse>> {
        let table = self.resolve_name(request.table, self.defaults.table.as_ref(), "table")?;
        let column = self.resolve_name(request.column, self.defaults.column.as_ref(), "column")?;
        let id_column = request
            .id_column
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.defaults.id_column.clone());

        let records = request.records.into_vec();
        if records.is_empty() {
            return Err(QueryError::missing(
                "records",
                "supply one record or a list of records, each with a `vector`",
            )
            .into());
        }

        let statements = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let vector = self.prepare_vector(
                    &record.vector,
                    request.normalize,
                    request.dimension,
                    &format!("record {index} has no `vector`"),
                )?;
                let statement = match operation {
                    Operation::Upsert => {
                        build_upsert(&table, &column, &id_column, &vector, &record.fields)?
                    }
                    _ => build_insert(&table, &column, &id_column, &vector, &record.fields)?,
                };
                Ok(statement)
            })
            .collect::<OpsResult<Vec<Statement>>>()?;

        debug!(
            stage = "vector_operation_started",
            backend = "pgvector",
            operation = operation.as_str(),
            records = statements.len(),
            "Starting vector write operation"
        );

        let pool = self.pool(&request.connection)?;
        let outputs = pool
            .execute_batch_with_retry(
                &statements,
                &Self::timeout_settings(request.timeout_ms),
                operation.as_str(),
            )
            .await?;

        let attempts = outputs.first().map_or(0, |output| output.attempts);
        let row_count = outputs.iter().map(|output| output.row_count).sum();
        // Each statement returns exactly the id column.
        let ids = outputs
            .into_iter()
            .flat_map(|output| output.rows)
            .filter_map(|row| row.into_iter().next().map(|(_, id)| id))
            .collect::<Vec<_>>();

        Ok(Observed {
            item_count: ids.len(),
            attempts,
            value: WriteResponse { ids, row_count },
        })
    }
}
