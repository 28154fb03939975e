use std::{io, time::Duration};

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Pool is closed")]
    Closed,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Pool did not close within {0:?}")]
    CloseTimedOut(Duration),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DbError::Sqlx(err) => classify_error(err),
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// SQLSTATE code of a backend error, if any.
    pub fn code(&self) -> Option<String> {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// The backend's own message, without sqlx's prefix.
    pub fn message(&self) -> String {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err.message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Infrastructure hiccup: refused, unreachable, timed out, overloaded, terminated.
    Retryable,
    /// Everything else, including syntax, permission and constraint errors.
    Fatal,
}

// SQLSTATE codes for transient server conditions.
const CANNOT_CONNECT_NOW: &str = "57P03";
const TOO_MANY_CONNECTIONS: &str = "53300";
const ADMIN_SHUTDOWN: &str = "57P01";
const CONNECTION_EXCEPTION_CLASS: &str = "08";

pub fn classify_error(error: &sqlx::Error) -> ErrorClass {
    let retryable = match error {
        sqlx::Error::Io(io_err) => {
            is_transient_io(io_err.kind())
                || is_host_not_found(&io_err.to_string())
                || is_connection_terminated(&io_err.to_string())
        }
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code)
                if code == CANNOT_CONNECT_NOW
                    || code == TOO_MANY_CONNECTIONS
                    || code == ADMIN_SHUTDOWN
                    || code.starts_with(CONNECTION_EXCEPTION_CLASS) =>
            {
                true
            }
            _ => is_connection_terminated(db_err.message()),
        },
        sqlx::Error::Protocol(message) => is_connection_terminated(message),
        _ => false,
    };

    if retryable {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::AddrNotAvailable
    )
}

/// Message-based check for a connection dropped mid-flight.
///
/// Drivers report this inconsistently, so matching is on message text.
pub fn is_connection_terminated(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("connection terminated")
        || message.contains("terminating connection")
        || message.contains("server closed the connection")
        || message.contains("connection reset")
}

/// Message-based check for a failed DNS lookup.
pub fn is_host_not_found(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("nodename nor servname")
        || message.contains("no such host")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::borrow::Cow;

    use rstest::rstest;
    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    /// Minimal backend error carrying a SQLSTATE code.
    #[derive(Debug)]
    pub(crate) struct FakeDbError {
        pub code: &'static str,
        pub message: &'static str,
    }

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.code {
                "23505" => ErrorKind::UniqueViolation,
                "23502" => ErrorKind::NotNullViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    pub(crate) fn db_error(code: &'static str, message: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError { code, message }))
    }

    fn io_error(kind: io::ErrorKind, message: &str) -> sqlx::Error {
        sqlx::Error::Io(io::Error::new(kind, message.to_string()))
    }

    #[rstest]
    #[case::refused(io_error(io::ErrorKind::ConnectionRefused, "connection refused"))]
    #[case::reset(io_error(io::ErrorKind::ConnectionReset, "reset by peer"))]
    #[case::timed_out(io_error(io::ErrorKind::TimedOut, "timed out"))]
    #[case::host_not_found(io_error(
        io::ErrorKind::Other,
        "failed to lookup address information: Name or service not known"
    ))]
    #[case::pool_timed_out(sqlx::Error::PoolTimedOut)]
    #[case::cannot_connect_now(db_error("57P03", "the database system is starting up"))]
    #[case::too_many_connections(db_error("53300", "sorry, too many clients already"))]
    #[case::admin_shutdown(db_error(
        "57P01",
        "terminating connection due to administrator command"
    ))]
    #[case::connection_failure(db_error("08006", "connection failure"))]
    #[case::terminated_message(db_error("XX000", "Connection terminated unexpectedly"))]
    fn test_retryable(#[case] error: sqlx::Error) {
        assert_eq!(classify_error(&error), ErrorClass::Retryable, "{error}");
    }

    #[rstest]
    #[case::syntax(db_error("42601", "syntax error at or near \"SELEC\""))]
    #[case::permission(db_error("42501", "permission denied for table items"))]
    #[case::unique(db_error("23505", "duplicate key value violates unique constraint"))]
    #[case::undefined_table(db_error("42P01", "relation \"missing\" does not exist"))]
    #[case::statement_timeout(db_error("57014", "canceling statement due to statement timeout"))]
    #[case::pool_closed(sqlx::Error::PoolClosed)]
    #[case::row_not_found(sqlx::Error::RowNotFound)]
    #[case::other_io(io_error(io::ErrorKind::PermissionDenied, "permission denied"))]
    fn test_fatal(#[case] error: sqlx::Error) {
        assert_eq!(classify_error(&error), ErrorClass::Fatal, "{error}");
    }

    #[test]
    fn test_db_error_wrappers() {
        let err = DbError::from(db_error("53300", "too many clients"));
        assert!(err.is_retryable());
        assert_eq!(err.code().as_deref(), Some("53300"));
        assert_eq!(err.to_string(), "error returned from database: too many clients");
        assert_eq!(err.message(), "too many clients");
        assert_eq!(DbError::Closed.message(), DbError::Closed.to_string());

        assert!(!DbError::Closed.is_retryable());
        assert!(!DbError::InvalidConfig(ConfigError::Validation("x".into())).is_retryable());
        assert_eq!(DbError::Closed.code(), None);
    }

    #[rstest]
    #[case("Connection terminated unexpectedly", true)]
    #[case("FATAL: terminating connection due to idle-session timeout", true)]
    #[case("server closed the connection unexpectedly", true)]
    #[case("permission denied for table items", false)]
    fn test_is_connection_terminated(#[case] message: &str, #[case] expected: bool) {
        assert_eq!(is_connection_terminated(message), expected);
    }

    #[rstest]
    #[case("failed to lookup address information: Name or service not known", true)]
    #[case("nodename nor servname provided, or not known", true)]
    #[case("connection refused", false)]
    fn test_is_host_not_found(#[case] message: &str, #[case] expected: bool) {
        assert_eq!(is_host_not_found(message), expected);
    }
}
