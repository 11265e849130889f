//! Tracker configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Default allocator block granularity, in bytes.
pub const DEFAULT_ALIGN_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Allocator block size. Every live buffer is rounded up to a multiple of this.
    pub align_bytes: usize,

    /// Upper bound on observation diagnostics kept per session.
    pub max_diagnostics: usize,

    /// Element type used by factories when the workload does not pick one.
    pub default_dtype: DType,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            align_bytes: DEFAULT_ALIGN_BYTES,
            max_diagnostics: 64,
            default_dtype: DType::F32,
        }
    }
}

impl TrackerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SHADOWMEM_ALIGN_BYTES`: allocator block size in bytes
    /// - `SHADOWMEM_MAX_DIAGNOSTICS`: diagnostics kept per session
    /// - `SHADOWMEM_DEFAULT_DTYPE`: default factory dtype (e.g. `f16`)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SHADOWMEM_ALIGN_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.align_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("SHADOWMEM_MAX_DIAGNOSTICS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_diagnostics = v;
            }
        }

        if let Ok(s) = std::env::var("SHADOWMEM_DEFAULT_DTYPE") {
            if let Ok(v) = s.parse::<DType>() {
                cfg.default_dtype = v;
            }
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.align_bytes == 0 {
            return Err(Error::Config("align_bytes must be > 0".into()));
        }
        Ok(())
    }
}
