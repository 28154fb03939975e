use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Missing required field '{field}': {hint}")]
    MissingRequiredField { field: String, hint: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },
}

impl QueryError {
    pub fn missing(field: impl Into<String>, hint: impl Into<String>) -> Self {
        QueryError::MissingRequiredField {
            field: field.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
