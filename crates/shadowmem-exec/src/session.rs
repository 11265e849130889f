//! Tracking sessions.
//!
//! A session is one accounting context: its own registry, its own peak
//! tracker, and the mode that feeds them. Nothing is global, so sessions can
//! run back to back or nested on the same context.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use shadowmem_core::config::TrackerConfig;
use shadowmem_core::value::Value;
use shadowmem_mem::registry::{LiveBuffer, LiveRegistry};
use shadowmem_mem::sizing::AlignmentPolicy;

use crate::context::{ExecError, ModeGuard, ShadowContext};
use crate::mode::MemoryTrackingMode;
use crate::observer::{ObserveStats, ResultObserver};

pub struct TrackingSession {
    cfg: TrackerConfig,
    registry: LiveRegistry,
    mode: Arc<MemoryTrackingMode>,
}

impl TrackingSession {
    pub fn new(cfg: TrackerConfig) -> Result<Self, ExecError> {
        cfg.validate()?;
        let registry = LiveRegistry::new(AlignmentPolicy::from_config(&cfg)?);
        let observer = ResultObserver::new(registry.clone(), cfg.max_diagnostics);
        Ok(Self {
            cfg,
            registry,
            mode: Arc::new(MemoryTrackingMode::new(observer)),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    /// Start intercepting `ctx`. Tracking stops when the guard drops.
    #[must_use = "tracking stops as soon as the guard is dropped"]
    pub fn activate<'c>(&self, ctx: &'c ShadowContext) -> ActiveSession<'c> {
        #[cfg(feature = "tracing")]
        tracing::info!(align_bytes = self.cfg.align_bytes, "tracking session activated");
        ActiveSession {
            _guard: ctx.push_mode(self.mode.clone()),
        }
    }

    /// Run `workload` with tracking active. Tracking is torn down on every
    /// exit path, including an error or a panic inside the workload.
    pub fn run<T, E, F>(&self, ctx: &ShadowContext, workload: F) -> Result<T, E>
    where
        F: FnOnce(&ShadowContext) -> Result<T, E>,
    {
        let _active = self.activate(ctx);
        workload(ctx)
    }

    /// Observe a value produced outside the dispatch path (e.g. inputs built
    /// before activation).
    pub fn observe(&self, result: &Value) -> ObserveStats {
        self.mode.observer().observe_result(result)
    }

    pub fn registry(&self) -> &LiveRegistry {
        &self.registry
    }

    /// Highest live total seen so far, in bytes.
    pub fn peak_bytes(&self) -> usize {
        self.registry.peak()
    }

    pub fn live_bytes(&self) -> usize {
        self.registry.total_resident_bytes()
    }

    pub fn live_buffers(&self) -> Vec<LiveBuffer> {
        self.registry.live_buffers()
    }

    pub fn ops_observed(&self) -> u64 {
        self.mode.ops_observed()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.mode.observer().diagnostics()
    }

    pub fn report(&self) -> SessionReport {
        let report = SessionReport {
            align_bytes: self.cfg.align_bytes,
            peak_bytes: self.peak_bytes(),
            live_bytes: self.live_bytes(),
            live_buffers: self.registry.len(),
            ops_observed: self.ops_observed(),
            failures: self.mode.observer().failure_count(),
            diagnostics: self.diagnostics(),
        };
        #[cfg(feature = "tracing")]
        tracing::info!(
            peak_bytes = report.peak_bytes,
            live_bytes = report.live_bytes,
            ops_observed = report.ops_observed,
            failures = report.failures,
            "session report"
        );
        report
    }
}

impl fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSession")
            .field("cfg", &self.cfg)
            .field("registry", &self.registry)
            .field("ops_observed", &self.ops_observed())
            .finish()
    }
}

/// RAII handle for an active session.
pub struct ActiveSession<'c> {
    _guard: ModeGuard<'c>,
}

impl ActiveSession<'_> {
    /// End tracking now rather than at scope exit.
    pub fn deactivate(self) {}
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::info!("tracking session deactivated");
    }
}

/// What a session hands to the reporting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub align_bytes: usize,
    pub peak_bytes: usize,
    pub live_bytes: usize,
    pub live_buffers: usize,
    pub ops_observed: u64,
    pub failures: usize,
    pub diagnostics: Vec<String>,
}

impl SessionReport {
    pub fn to_json(&self) -> Result<String, ExecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
