#![forbid(unsafe_code)]
//! shadowmem-core: shared types for the shadowmem memory estimator.
//!
//! Everything here is pure data: buffer identities, dtypes, shapes, the
//! `Storage`/`Tensor` pair that shadow operations produce, and the nested
//! `Value` shape that an operation result takes. Accounting lives in
//! `shadowmem-mem`; dispatch and interception live in `shadowmem-exec`.

pub mod buffer;
pub mod config;
pub mod dtype;
pub mod error;
pub mod id;
pub mod prelude;
pub mod shape;
pub mod tensor;
pub mod value;

pub use error::{Error, Result};
