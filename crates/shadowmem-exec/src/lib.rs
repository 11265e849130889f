#![forbid(unsafe_code)]
//! shadowmem-exec: shadow execution, dispatch interception, and sessions.
//!
//! `ShadowContext` runs operations for shape/dtype only: every result carries
//! correctly sized buffers with real identities and aliasing, but no data.
//! Every dispatch goes through one hook point; `DispatchMode`s pushed onto
//! the context see each result after it is produced.
//!
//! `TrackingSession` pushes a `MemoryTrackingMode` for its lifetime and
//! exposes the peak resident bytes once the workload is done.

pub mod context;
pub mod dispatch;
pub mod kernels;
pub mod mode;
pub mod observer;
pub mod ops;
pub mod session;

pub use context::{ExecError, ModeGuard, ShadowContext};
pub use dispatch::{BinaryOp, DispatchMode, Fill, Op, UnaryOp};
pub use mode::MemoryTrackingMode;
pub use observer::{ObserveStats, ResultObserver};
pub use session::{ActiveSession, SessionReport, TrackingSession};
