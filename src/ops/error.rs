use serde::Serialize;
use thiserror::Error;

use crate::{config::ConfigError, db::DbError, sql::QueryError, vector::VectorError};

#[derive(Debug, Error)]
pub enum OpsError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Invalid request payload: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

pub type OpsResult<T> = Result<T, OpsError>;

/// Broad failure category reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller's input was wrong. Never reaches the database.
    Validation,
    /// Infrastructure failure that outlasted every retry.
    Transient,
    /// The database rejected the statement.
    Backend,
}

/// Serializable error summary for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    pub retryable: bool,
}

impl OpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::Vector(_)
            | OpsError::Query(_)
            | OpsError::Config(_)
            | OpsError::InvalidRequest(_)
            | OpsError::Db(DbError::InvalidConfig(_)) => ErrorKind::Validation,
            OpsError::Db(err) if err.is_retryable() => ErrorKind::Transient,
            OpsError::Db(_) => ErrorKind::Backend,
        }
    }

    /// SQLSTATE code of a backend error.
    pub fn code(&self) -> Option<String> {
        match self {
            OpsError::Db(err) => err.code(),
            _ => None,
        }
    }

    /// Message for the end user. Recognized SQLSTATE codes get a specific
    /// explanation; anything else is the underlying message.
    pub fn user_message(&self) -> String {
        let raw = match self {
            OpsError::Db(err) => err.message(),
            _ => self.to_string(),
        };
        let Some(code) = self.code() else {
            return raw;
        };

        match code.as_str() {
            "42P01" => format!("Table does not exist, create it first: {raw}"),
            "42703" => format!(
                "Column does not exist: {raw}. Check the column, filter and select names"
            ),
            "42704" | "42883" => format!(
                "pgvector type or operator not found: {raw}. Enable the extension with \
                 the create-extension admin action"
            ),
            "42501" => format!(
                "Permission denied: {raw}. Grant the connecting role access to the table"
            ),
            "23505" => format!("A row with this key already exists: {raw}. Use upsert to replace it"),
            "23502" => format!("A required column has no value: {raw}"),
            "22P02" | "22000" => format!(
                "Malformed value: {raw}. Check that the vector dimension matches the column"
            ),
            "42601" => format!("SQL syntax error: {raw}. Check the where and select expressions"),
            "57014" => format!(
                "Statement timed out: {raw}. Raise timeoutMs or add an index to the column"
            ),
            _ => raw,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let kind = self.kind();
        ErrorReport {
            kind,
            code: self.code(),
            message: self.user_message(),
            retryable: kind == ErrorKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::db::db_error;

    #[rstest]
    #[case::undefined_table("42P01", "relation \"missing\" does not exist", "create it first")]
    #[case::undefined_column("42703", "column \"x\" does not exist", "Column does not exist")]
    #[case::missing_type("42704", "type \"vector\" does not exist", "create-extension")]
    #[case::missing_operator("42883", "operator does not exist: vector <=> vector", "create-extension")]
    #[case::permission("42501", "permission denied for table items", "Grant the connecting role")]
    #[case::unique("23505", "duplicate key value", "Use upsert")]
    #[case::not_null("23502", "null value in column", "required column")]
    #[case::dimension("22000", "expected 3 dimensions, not 2", "vector dimension")]
    #[case::malformed("22P02", "invalid input syntax for type vector", "Malformed value")]
    #[case::syntax("42601", "syntax error at or near", "where and select")]
    #[case::timeout("57014", "canceling statement due to statement timeout", "timeoutMs")]
    fn test_translated_messages(
        #[case] code: &'static str,
        #[case] message: &'static str,
        #[case] expected: &str,
    ) {
        let err = OpsError::from(DbError::from(db_error(code, message)));
        let text = err.user_message();
        assert!(text.contains(expected), "{text}");
        // The backend diagnostic is kept alongside the translation
        assert!(text.contains(message), "{text}");
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.code().as_deref(), Some(code));
    }

    #[test]
    fn test_unknown_code_uses_raw_message() {
        let err = OpsError::from(DbError::from(db_error("XX001", "data corrupted")));
        assert_eq!(err.user_message(), "data corrupted");
    }

    #[test]
    fn test_validation_report() {
        let err = OpsError::from(QueryError::missing("table", "set `table` on the request"));
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::Validation);
        assert_eq!(report.code, None);
        assert!(!report.retryable);
        assert!(report.message.contains("table"));

        let err = OpsError::from(VectorError::DimensionMismatch {
            actual: 3,
            expected: 5,
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_transient_report() {
        let err = OpsError::from(DbError::from(sqlx::Error::PoolTimedOut));
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::Transient);
        assert!(report.retryable);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "transient");
        assert!(json.get("code").is_none());
    }
}
