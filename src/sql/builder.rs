//! Statement builders for similarity search, writes, DDL and introspection.
//!
//! Every builder is pure: identical input produces byte-identical output.

use serde_json::{Map, Value};

use super::{
    QueryError, QueryResult, SimilarityMetric, SqlParam, Statement, escape_identifier,
    escape_select_clause,
};
use crate::vector::to_pgvector_literal;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 10_000;

/// Largest dimension pgvector accepts for a `vector` column.
pub const MAX_DIMENSION: usize = 16_000;

/// Clamp a requested result limit into `[1, MAX_LIMIT]`.
///
/// Absent or zero means [`DEFAULT_LIMIT`].
pub fn clamp_limit(requested: Option<i64>) -> i64 {
    let limit = match requested {
        None | Some(0) => DEFAULT_LIMIT,
        Some(n) => n,
    };
    limit.clamp(1, MAX_LIMIT)
}

/// A composed similarity search request.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub table: Option<String>,
    pub column: Option<String>,
    pub vector: Vec<f64>,
    pub metric: SimilarityMetric,
    pub limit: Option<i64>,
    /// Equality filters. Parameter positions follow insertion order.
    pub filter: Map<String, Value>,
    /// Raw boolean expression ANDed into the WHERE clause verbatim.
    pub where_clause: Option<String>,
    /// Projection list; defaults to `*`.
    pub select: Option<String>,
}

fn required<'a>(value: Option<&'a str>, field: &str, hint: &str) -> QueryResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(QueryError::missing(field, hint)),
    }
}

/// Build `SELECT <select>, <column> <op> $1::vector AS similarity FROM <table>
/// [WHERE ...] ORDER BY similarity ASC LIMIT <n>`.
///
/// `$1` is the query vector literal; filter values follow as `$2..` in map order.
pub fn build_similarity_query(spec: &QuerySpec) -> QueryResult<Statement> {
    let table = required(
        spec.table.as_deref(),
        "table",
        "set `table` on the request or `defaults.table` in the configuration",
    )?;
    let column = required(
        spec.column.as_deref(),
        "column",
        "set `column` on the request or `defaults.column` in the configuration",
    )?;

    let table = escape_identifier(table)?;
    let column = escape_identifier(column)?;
    let select = escape_select_clause(spec.select.as_deref())?;
    let op = spec.metric.pgvector_operator();

    let mut params = vec![SqlParam::Text(to_pgvector_literal(&spec.vector))];
    let mut clauses = Vec::with_capacity(spec.filter.len() + 1);

    for (key, value) in &spec.filter {
        let key = escape_identifier(key)?;
        let param = SqlParam::from(value);
        let clause = filter_clause(&key, &param, params.len() + 1);
        params.push(param);
        clauses.push(clause);
    }

    if let Some(expr) = spec
        .where_clause
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        clauses.push(format!("({expr})"));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let text = format!(
        "SELECT {select}, {column} {op} $1::vector AS similarity FROM {table}{where_sql} \
         ORDER BY similarity ASC LIMIT {}",
        clamp_limit(spec.limit)
    );
    Ok(Statement::with_params(text, params))
}

/// Equality clause for one filter entry.
///
/// The column side is cast to the bind type for text and JSON values so a
/// string filter works against uuid, enum or varchar columns alike. On text,
/// varchar and jsonb columns the cast is binary-coercible and btree indexes
/// still apply; on uuid or enum columns it is a conversion and they do not.
/// Null filters match SQL NULL.
fn filter_clause(column: &str, param: &SqlParam, idx: usize) -> String {
    match param {
        SqlParam::Null => format!("{column}::text IS NOT DISTINCT FROM ${idx}"),
        SqlParam::Text(_) => format!("{column}::text = ${idx}"),
        SqlParam::Json(_) => format!("{column}::jsonb = ${idx}"),
        SqlParam::Bool(_) | SqlParam::Int(_) | SqlParam::Float(_) => {
            format!("{column} = ${idx}")
        }
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Build an `INSERT` for one record.
///
/// Extra fields travel as a single `jsonb` parameter expanded through
/// `jsonb_populate_record`, so PostgreSQL converts each value to its column's
/// declared type (uuid, timestamptz, jsonb, ...).
pub fn build_insert(
    table: &str,
    column: &str,
    id_column: &str,
    vector: &[f64],
    fields: &Map<String, Value>,
) -> QueryResult<Statement> {
    build_write(table, column, id_column, vector, fields, false)
}

/// Build an `INSERT ... ON CONFLICT (<id_column>) DO UPDATE` for one record.
///
/// The record must carry its id field; every other supplied column is updated.
pub fn build_upsert(
    table: &str,
    column: &str,
    id_column: &str,
    vector: &[f64],
    fields: &Map<String, Value>,
) -> QueryResult<Statement> {
    match fields.get(id_column) {
        None | Some(Value::Null) => Err(QueryError::missing(
            id_column,
            "upsert records must include their id field",
        )),
        Some(_) => build_write(table, column, id_column, vector, fields, true),
    }
}

fn build_write(
    table: &str,
    column: &str,
    id_column: &str,
    vector: &[f64],
    fields: &Map<String, Value>,
    upsert: bool,
) -> QueryResult<Statement> {
    let table_raw = required(Some(table), "table", "set `table` on the request")?;
    let column_raw = required(Some(column), "column", "set `column` on the request")?;
    let id_raw = required(Some(id_column), "idColumn", "set `idColumn` on the request")?;

    if fields.contains_key(column_raw) {
        return Err(QueryError::invalid(
            column_raw,
            "the embedding column must be supplied through `vector`",
        ));
    }

    let table = escape_identifier(table_raw)?;
    let column = escape_identifier(column_raw)?;
    let id_column = escape_identifier(id_raw)?;
    let field_columns = fields
        .keys()
        .map(|k| escape_identifier(k))
        .collect::<QueryResult<Vec<_>>>()?;

    let vector_param = SqlParam::Text(to_pgvector_literal(vector));

    let (mut text, params) = if field_columns.is_empty() {
        (
            format!("INSERT INTO {table} ({column}) VALUES ($1::vector)"),
            vec![vector_param],
        )
    } else {
        let targets = field_columns.join(", ");
        let sources = field_columns
            .iter()
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        (
            format!(
                "INSERT INTO {table} ({column}, {targets}) \
                 SELECT $1::vector, {sources} FROM jsonb_populate_record(NULL::{table}, $2) AS r"
            ),
            vec![vector_param, SqlParam::Json(Value::Object(fields.clone()))],
        )
    };

    if upsert {
        let updates = std::iter::once(&column)
            .chain(field_columns.iter().filter(|c| **c != id_column))
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!(" ON CONFLICT ({id_column}) DO UPDATE SET {updates}"));
    }

    text.push_str(&format!(" RETURNING {id_column}"));
    Ok(Statement::with_params(text, params))
}

// ============================================================================
// Admin DDL
// ============================================================================

/// Approximate nearest-neighbor index type and build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    IvfFlat { lists: u32 },
    Hnsw { m: u32, ef_construction: u32 },
}

impl IndexKind {
    pub const DEFAULT_LISTS: u32 = 100;
    pub const DEFAULT_M: u32 = 16;
    pub const DEFAULT_EF_CONSTRUCTION: u32 = 64;

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::IvfFlat { .. } => "ivfflat",
            IndexKind::Hnsw { .. } => "hnsw",
        }
    }
}

pub fn create_extension() -> Statement {
    Statement::new("CREATE EXTENSION IF NOT EXISTS vector")
}

pub fn create_table(
    table: &str,
    column: &str,
    id_column: &str,
    dimension: Option<usize>,
) -> QueryResult<Statement> {
    let dimension = match dimension {
        Some(d) if (1..=MAX_DIMENSION).contains(&d) => d,
        Some(d) => {
            return Err(QueryError::invalid(
                "dimension",
                format!("must be between 1 and {MAX_DIMENSION}, got {d}"),
            ));
        }
        None => {
            return Err(QueryError::missing(
                "dimension",
                "set `dimension` on the request or `defaults.dimension` in the configuration",
            ));
        }
    };
    let table = escape_identifier(required(Some(table), "table", "set `table` on the request")?)?;
    let column =
        escape_identifier(required(Some(column), "column", "set `column` on the request")?)?;
    let id_column = escape_identifier(required(
        Some(id_column),
        "idColumn",
        "set `idColumn` on the request",
    )?)?;

    Ok(Statement::new(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         {id_column} BIGSERIAL PRIMARY KEY, \
         {column} vector({dimension}) NOT NULL, \
         metadata JSONB, \
         created_at TIMESTAMPTZ NOT NULL DEFAULT now())"
    )))
}

/// Default index name: `<table>_<column>_<kind>_idx`, using the unqualified table name.
pub fn default_index_name(table: &str, column: &str, kind: IndexKind) -> String {
    let table = table.rsplit('.').next().unwrap_or(table);
    format!("{}_{}_{}_idx", table, column, kind.name())
}

pub fn create_index(
    table: &str,
    column: &str,
    metric: SimilarityMetric,
    kind: IndexKind,
    index_name: Option<&str>,
) -> QueryResult<Statement> {
    let table_raw = required(Some(table), "table", "set `table` on the request")?;
    let column_raw = required(Some(column), "column", "set `column` on the request")?;
    let name = match index_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => default_index_name(table_raw, column_raw, kind),
    };

    let with = match kind {
        IndexKind::IvfFlat { lists } => {
            if lists == 0 {
                return Err(QueryError::invalid("lists", "must be at least 1"));
            }
            format!("lists = {lists}")
        }
        IndexKind::Hnsw { m, ef_construction } => {
            if m < 2 {
                return Err(QueryError::invalid("m", "must be at least 2"));
            }
            if ef_construction < 2 * m {
                return Err(QueryError::invalid(
                    "efConstruction",
                    format!("must be at least 2 * m ({})", 2 * m),
                ));
            }
            format!("m = {m}, ef_construction = {ef_construction}")
        }
    };

    Ok(Statement::new(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING {} ({} {}) WITH ({})",
        escape_identifier(&name)?,
        escape_identifier(table_raw)?,
        kind.name(),
        escape_identifier(column_raw)?,
        metric.pgvector_ops_class(),
        with
    )))
}

pub fn drop_index(index_name: Option<&str>) -> QueryResult<Statement> {
    let name = required(
        index_name,
        "indexName",
        "set `indexName` to the index to drop",
    )?;
    Ok(Statement::new(format!(
        "DROP INDEX IF EXISTS {}",
        escape_identifier(name)?
    )))
}

/// Transaction-local `ivfflat.probes` assignment, used to check a probes
/// value against the backend without changing the pooled session.
pub fn set_probes(probes: Option<u32>) -> QueryResult<Statement> {
    match probes {
        Some(p) if p >= 1 => Ok(Statement::with_params(
            "SELECT set_config('ivfflat.probes', $1, true) AS probes",
            vec![SqlParam::Text(p.to_string())],
        )),
        Some(_) => Err(QueryError::invalid("probes", "must be at least 1")),
        None => Err(QueryError::missing(
            "probes",
            "set `probes` to the number of ivfflat lists to scan",
        )),
    }
}

// ============================================================================
// Introspection
// ============================================================================

pub fn list_tables() -> Statement {
    Statement::new(
        "SELECT table_schema::text AS table_schema, table_name::text AS table_name, \
         table_type::text AS table_type \
         FROM information_schema.tables \
         WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
         ORDER BY table_schema, table_name",
    )
}

/// Columns of `table`, which may be schema-qualified.
///
/// Unqualified names resolve against the session's search path.
pub fn list_columns(table: &str) -> QueryResult<Statement> {
    let table = required(Some(table), "table", "set `table` to introspect")?;
    let select = "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                  udt_name::text AS udt_name, (is_nullable = 'YES') AS nullable, \
                  ordinal_position::int4 AS ordinal_position \
                  FROM information_schema.columns";

    let statement = match table.split_once('.') {
        Some((schema, name)) => Statement::with_params(
            format!("{select} WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position"),
            vec![SqlParam::Text(schema.into()), SqlParam::Text(name.into())],
        ),
        None => Statement::with_params(
            format!(
                "{select} WHERE table_name = $1 AND table_schema = ANY(current_schemas(false)) \
                 ORDER BY ordinal_position"
            ),
            vec![SqlParam::Text(table.into())],
        ),
    };
    Ok(statement)
}
