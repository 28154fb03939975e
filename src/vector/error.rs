use thiserror::Error;

/// Longest input excerpt carried by [`VectorError::UnsupportedFormat`].
pub const INPUT_EXCERPT_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Unsupported vector format: {input:?}. Expected a numeric array, a JSON array string, \
         a comma-separated string or base64-encoded float32 values"
    )]
    UnsupportedFormat { input: String },

    #[error("Not a vector: {0}")]
    NotAVector(String),

    #[error("Vector element {index} is not a finite number")]
    NonFiniteElement { index: usize },

    #[error("Vector dimension mismatch: got {actual}, expected {expected}")]
    DimensionMismatch { actual: usize, expected: usize },
}

impl VectorError {
    /// Build an `UnsupportedFormat` error, truncating the input on a char boundary.
    pub(crate) fn unsupported(input: &str) -> Self {
        let input = match input.char_indices().nth(INPUT_EXCERPT_LEN) {
            Some((end, _)) => format!("{}...", &input[..end]),
            None => input.to_string(),
        };
        VectorError::UnsupportedFormat { input }
    }
}

pub type VectorResult<T> = Result<T, VectorError>;
