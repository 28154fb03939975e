use serde_json::Value;
use tracing::instrument;

use super::{
    ColumnInfo, Observed, Operation, OpsResult, RawQueryRequest, SchemaRequest, SchemaResponse,
    TableInfo, VectorOps,
};
use crate::{
    db::QueryOutput,
    sql::{
        QueryError, SqlParam, Statement,
        builder::{list_columns, list_tables},
    },
};

impl VectorOps {
    /// Run caller-authored SQL with positional parameters.
    ///
    /// The text is sent as written; only `params` are bound.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "raw_query"))]
    pub async fn raw_query(&self, request: RawQueryRequest) -> OpsResult<QueryOutput> {
        self.observe(Operation::RawQuery, self.run_raw_query(request))
            .await
    }

    async fn run_raw_query(&self, request: RawQueryRequest) -> OpsResult<Observed<QueryOutput>> {
        let sql = request
            .sql
            .as_deref()
            .map(str::trim)
            .filter(|sql| !sql.is_empty())
            .ok_or_else(|| QueryError::missing("sql", "set `sql` to the statement to run"))?;
        let params = request.params.into_iter().map(SqlParam::from).collect();
        let statement = Statement::with_params(sql, params);

        let pool = self.pool(&request.connection)?;
        let output = pool
            .execute_with_retry(
                &statement,
                &Self::timeout_settings(request.timeout_ms),
                Operation::RawQuery.as_str(),
            )
            .await?;

        Ok(Observed {
            item_count: output.rows.len(),
            attempts: output.attempts,
            value: output,
        })
    }

    /// List user tables, or the columns of `request.table`.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "describe_schema"))]
    pub async fn describe_schema(&self, request: SchemaRequest) -> OpsResult<SchemaResponse> {
        self.observe(Operation::DescribeSchema, self.run_describe_schema(request))
            .await
    }

    async fn run_describe_schema(
        &self,
        request: SchemaRequest,
    ) -> OpsResult<Observed<SchemaResponse>> {
        let table = request
            .table
            .map(|table| table.trim().to_string())
            .filter(|table| !table.is_empty());
        let statement = match &table {
            Some(table) => list_columns(table)?,
            None => list_tables(),
        };

        let pool = self.pool(&request.connection)?;
        let output = pool
            .execute_with_retry(
                &statement,
                &Self::timeout_settings(request.timeout_ms),
                Operation::DescribeSchema.as_str(),
            )
            .await?;

        let item_count = output.rows.len();
        let rows = output.rows.into_iter().map(Value::Object);
        let value = match table {
            Some(table) => SchemaResponse::Columns {
                table,
                columns: rows
                    .map(serde_json::from_value::<ColumnInfo>)
                    .collect::<Result<_, _>>()?,
            },
            None => SchemaResponse::Tables {
                tables: rows
                    .map(serde_json::from_value::<TableInfo>)
                    .collect::<Result<_, _>>()?,
            },
        };

        Ok(Observed {
            value,
            item_count,
            attempts: output.attempts,
        })
    }
}
