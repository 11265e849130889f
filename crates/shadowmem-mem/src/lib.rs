#![forbid(unsafe_code)]
//! shadowmem-mem: resident-byte accounting for shadow buffers.
//!
//! Three pieces, leaves first:
//! - `sizing`: element count x width, rounded up to the allocator block size.
//! - `tracking`: the running high-water mark.
//! - `registry`: the live set, held through weak handles only, recomputed on
//!   every insert and every release.

pub mod error;
pub mod registry;
pub mod sizing;
pub mod tracking;

pub use error::{Error, Result};
pub use registry::{LiveBuffer, LiveRegistry};
pub use sizing::AlignmentPolicy;
pub use tracking::PeakTracker;
