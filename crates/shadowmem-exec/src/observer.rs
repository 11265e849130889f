//! Result-value observer.
//!
//! Walks an operation result, finds every tensor, and registers each
//! distinct backing buffer with the live registry. The walk is read-only.
//! Failures are kept as diagnostics; they never reach the workload.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use shadowmem_core::id::BufferId;
use shadowmem_core::value::Value;
use shadowmem_mem::registry::LiveRegistry;

/// What one `observe_result` call did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObserveStats {
    /// Tensors found in the result, counting repeats.
    pub tensors_seen: usize,
    /// Buffers this call added to the registry.
    pub buffers_registered: usize,
    /// Buffers that could not be accounted for.
    pub failures: usize,
}

pub struct ResultObserver {
    registry: LiveRegistry,
    max_diagnostics: usize,
    diagnostics: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl ResultObserver {
    pub fn new(registry: LiveRegistry, max_diagnostics: usize) -> Self {
        Self {
            registry,
            max_diagnostics,
            diagnostics: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &LiveRegistry {
        &self.registry
    }

    /// Register every buffer reachable from `result`.
    ///
    /// Each buffer is registered at most once per call, however many views
    /// of it the result holds. Non-tensor leaves are skipped.
    pub fn observe_result(&self, result: &Value) -> ObserveStats {
        let mut stats = ObserveStats::default();
        let mut visited: HashSet<BufferId> = HashSet::new();

        result.visit_tensors(&mut |t| {
            stats.tensors_seen += 1;
            if !visited.insert(t.buffer_id()) {
                return;
            }
            match self.registry.register(t.storage()) {
                Ok(true) => stats.buffers_registered += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.failures += 1;
                    self.record(format!("{}: {e}", t.buffer_id()));
                }
            }
        });

        stats
    }

    /// Total buffers that failed to register over the observer's lifetime.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Kept diagnostics, oldest first; bounded by `max_diagnostics`.
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, msg: String) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::warn!(diagnostic = %msg, "buffer not accounted");
        let mut diags = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if diags.len() < self.max_diagnostics {
            diags.push(msg);
        }
    }
}
