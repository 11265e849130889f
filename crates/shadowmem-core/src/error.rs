use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("DType error: {0}")]
    DType(String),

    #[error("{op} expects {expected} input(s), got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("dimension {dim} out of range for rank {rank}")]
    InvalidDim { dim: usize, rank: usize },

    #[error("size overflow: {elements} elements of {width} bytes")]
    SizeOverflow { elements: usize, width: usize },

    #[error("Internal invariant failed: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
