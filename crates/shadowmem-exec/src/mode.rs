//! The memory tracking mode: the interception layer proper.

use std::sync::atomic::{AtomicU64, Ordering};

use shadowmem_core::value::Value;

use crate::dispatch::{DispatchMode, Op};
use crate::observer::ResultObserver;

/// Observes the result of every dispatched operation while active.
pub struct MemoryTrackingMode {
    observer: ResultObserver,
    ops_observed: AtomicU64,
}

impl MemoryTrackingMode {
    pub fn new(observer: ResultObserver) -> Self {
        Self {
            observer,
            ops_observed: AtomicU64::new(0),
        }
    }

    pub fn observer(&self) -> &ResultObserver {
        &self.observer
    }

    pub fn ops_observed(&self) -> u64 {
        self.ops_observed.load(Ordering::Relaxed)
    }
}

impl DispatchMode for MemoryTrackingMode {
    fn name(&self) -> &'static str {
        "memory-tracking"
    }

    fn after_dispatch(&self, _op: &Op, result: &Value) {
        self.ops_observed.fetch_add(1, Ordering::Relaxed);
        let _stats = self.observer.observe_result(result);
        #[cfg(feature = "tracing")]
        {
            if _stats.failures > 0 {
                tracing::warn!(
                    op = _op.name(),
                    failures = _stats.failures,
                    "result only partially accounted"
                );
            } else {
                tracing::trace!(
                    op = _op.name(),
                    new_buffers = _stats.buffers_registered,
                    live_bytes = self.observer.registry().total_resident_bytes(),
                    "op observed"
                );
            }
        }
    }
}
