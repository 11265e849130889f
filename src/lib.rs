#![forbid(unsafe_code)]
//! shadowmem: estimate the peak memory a workload would need, without
//! running it.
//!
//! Workloads issue operations through a [`ShadowContext`]; a
//! [`TrackingSession`] intercepts every result, tracks which backing buffers
//! are still reachable, and keeps the high-water mark of their aligned sizes.
//!
//! ```
//! use shadowmem::prelude::*;
//!
//! let session = TrackingSession::new(TrackerConfig::default()).unwrap();
//! let ctx = ShadowContext::new();
//! session
//!     .run(&ctx, |ctx| {
//!         let a = ctx.zeros([1000], DType::F32)?;
//!         let _b = ctx.zeros([100], DType::F32)?;
//!         drop(a);
//!         Ok::<_, ExecError>(())
//!     })
//!     .unwrap();
//! assert_eq!(session.peak_bytes(), 4096 + 512);
//! ```

pub use shadowmem_exec::{ExecError, ShadowContext, TrackingSession};

pub mod prelude {
    pub use shadowmem_core::prelude::*;
    pub use shadowmem_exec::{
        DispatchMode, ExecError, MemoryTrackingMode, Op, SessionReport, ShadowContext,
        TrackingSession,
    };
    pub use shadowmem_mem::{AlignmentPolicy, LiveRegistry, PeakTracker};
}
