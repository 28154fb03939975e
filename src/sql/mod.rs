//! SQL text generation for pgvector operations.
//!
//! Identifiers cannot travel as bind parameters, so every caller-supplied
//! table, column and index name goes through [`escape_identifier`]. Values
//! always travel as positional parameters in a [`Statement`]; the only
//! literals embedded in statement text are validated, bounded integers.

pub mod builder;
mod error;
mod escape;
mod metric;
mod statement;

pub use builder::{
    DEFAULT_LIMIT, IndexKind, MAX_LIMIT, QuerySpec, build_insert, build_similarity_query,
    build_upsert, clamp_limit,
};
pub use error::{QueryError, QueryResult};
pub use escape::{escape_identifier, escape_select_clause};
pub use metric::SimilarityMetric;
pub use statement::{SqlParam, Statement};
