//! Convenient re-exports for downstream crates.

pub use crate::buffer::{ReleaseObserver, Storage, WeakStorage};
pub use crate::config::{TrackerConfig, DEFAULT_ALIGN_BYTES};
pub use crate::dtype::DType;
pub use crate::error::{Error, Result};
pub use crate::id::{BufferId, ModeId};
pub use crate::shape::Shape;
pub use crate::tensor::Tensor;
pub use crate::value::Value;
