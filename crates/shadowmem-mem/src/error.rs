use thiserror::Error;

/// Result type local to shadowmem-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("alignment must be > 0 bytes")]
    InvalidAlignment,

    #[error("element width must be > 0 bytes (got {0})")]
    InvalidElementWidth(usize),

    #[error("size overflow: {elements} elements of {width} bytes at {align}-byte alignment")]
    SizeOverflow {
        elements: usize,
        width: usize,
        align: usize,
    },
}
