//! pgvector operations over a retrying PostgreSQL pool.
//!
//! Layers, leaf first:
//!
//! * [`vector`] decodes, checks and normalizes embeddings.
//! * [`sql`] escapes identifiers and builds parameterized statements.
//! * [`db`] owns the connection pool, scoped connections and retries.
//! * [`ops`] is the facade hosts call: search, insert, upsert, admin, raw
//!   queries and schema introspection.
//!
//! ```no_run
//! use pgvector_ops::{Config, ops::{SearchRequest, VectorOps}};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), pgvector_ops::ops::OpsError> {
//! let ops = VectorOps::new(Config::from_file("pgvector.toml")?)?;
//! let rows = ops
//!     .search(SearchRequest {
//!         table: Some("documents".into()),
//!         column: Some("embedding".into()),
//!         vector: json!([0.1, 0.2, 0.3]),
//!         limit: Some(5),
//!         ..Default::default()
//!     })
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod observability;
pub mod ops;
pub mod sql;
pub mod vector;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use db::{DbError, VectorPool, close_pool};
pub use ops::{Operation, OpsError, VectorOps};
