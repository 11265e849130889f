//! Shadow execution context: the single dispatch hook point.
//!
//! Every operation the workload issues ends up in `ShadowContext::dispatch`.
//! The kernel runs first; then each active mode is shown the result, in the
//! order the modes were pushed; then the result goes back to the caller
//! untouched. Modes are activated with `push_mode`, which returns a guard
//! that deactivates on drop (including during unwinding).

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use shadowmem_core::config::TrackerConfig;
use shadowmem_core::dtype::DType;
use shadowmem_core::id::ModeId;
use shadowmem_core::tensor::Tensor;
use shadowmem_core::value::Value;

use crate::dispatch::{DispatchMode, Op};
use crate::kernels;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("op: {0}")]
    Core(#[from] shadowmem_core::Error),
    #[error("accounting: {0}")]
    Mem(#[from] shadowmem_mem::Error),
    #[error("report: {0}")]
    Report(#[from] serde_json::Error),
}

type ModeStack = Vec<(ModeId, Arc<dyn DispatchMode>)>;

pub struct ShadowContext {
    default_dtype: DType,
    modes: RwLock<ModeStack>,
}

impl Default for ShadowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowContext {
    pub fn new() -> Self {
        Self::with_default_dtype(DType::default())
    }

    pub fn with_default_dtype(default_dtype: DType) -> Self {
        Self {
            default_dtype,
            modes: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(cfg: &TrackerConfig) -> Self {
        Self::with_default_dtype(cfg.default_dtype)
    }

    pub fn default_dtype(&self) -> DType {
        self.default_dtype
    }

    /// Execute `op` and let every active mode observe its result.
    ///
    /// A kernel error is the workload's error and is returned as-is; nothing
    /// is observed in that case. Modes cannot change or fail the result.
    pub fn dispatch(&self, op: Op, inputs: &[&Tensor]) -> Result<Value, ExecError> {
        let result = kernels::execute(&op, inputs)?;
        for mode in self.active_modes() {
            mode.after_dispatch(&op, &result);
        }
        Ok(result)
    }

    /// Activate `mode` until the returned guard is dropped.
    #[must_use = "the mode is deactivated as soon as the guard is dropped"]
    pub fn push_mode(&self, mode: Arc<dyn DispatchMode>) -> ModeGuard<'_> {
        let id = ModeId::next();
        #[cfg(feature = "tracing")]
        tracing::debug!(%id, mode = mode.name(), "dispatch mode pushed");
        self.modes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, mode));
        ModeGuard { ctx: self, id }
    }

    /// True while at least one mode is active.
    pub fn is_intercepting(&self) -> bool {
        !self
            .modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn active_mode_names(&self) -> Vec<&'static str> {
        self.modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, m)| m.name())
            .collect()
    }

    // Snapshot so modes run without the stack lock held.
    fn active_modes(&self) -> Vec<Arc<dyn DispatchMode>> {
        self.modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, m)| Arc::clone(m))
            .collect()
    }

    fn remove_mode(&self, id: ModeId) {
        let mut modes = self.modes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = modes.iter().position(|(mid, _)| *mid == id) {
            let (_, _mode) = modes.remove(pos);
            #[cfg(feature = "tracing")]
            tracing::debug!(%id, mode = _mode.name(), "dispatch mode popped");
        }
    }
}

impl std::fmt::Debug for ShadowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowContext")
            .field("default_dtype", &self.default_dtype)
            .field("modes", &self.active_mode_names())
            .finish()
    }
}

/// RAII activation of a dispatch mode. Dropping it deactivates exactly that
/// mode, whatever else was pushed or popped in between.
pub struct ModeGuard<'a> {
    ctx: &'a ShadowContext,
    id: ModeId,
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.remove_mode(self.id);
    }
}
