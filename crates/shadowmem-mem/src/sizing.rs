//! Alignment/sizing policy.
//!
//! `resident = ceil(elements * width / align) * align`. Pure; fails fast
//! rather than wrapping when the arithmetic overflows.

use shadowmem_core::buffer::Storage;
use shadowmem_core::config::{TrackerConfig, DEFAULT_ALIGN_BYTES};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentPolicy {
    align: usize,
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        Self {
            align: DEFAULT_ALIGN_BYTES,
        }
    }
}

impl AlignmentPolicy {
    pub fn new(align: usize) -> Result<Self> {
        if align == 0 {
            return Err(Error::InvalidAlignment);
        }
        Ok(Self { align })
    }

    pub fn from_config(cfg: &TrackerConfig) -> Result<Self> {
        Self::new(cfg.align_bytes)
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Raw size in bytes, independent of logical shape.
    pub fn size_bytes(&self, elements: usize, width: usize) -> Result<usize> {
        if width == 0 {
            return Err(Error::InvalidElementWidth(width));
        }
        elements.checked_mul(width).ok_or(Error::SizeOverflow {
            elements,
            width,
            align: self.align,
        })
    }

    /// Size rounded up to a whole number of allocator blocks.
    pub fn resident_bytes(&self, elements: usize, width: usize) -> Result<usize> {
        let size = self.size_bytes(elements, width)?;
        size.div_ceil(self.align)
            .checked_mul(self.align)
            .ok_or(Error::SizeOverflow {
                elements,
                width,
                align: self.align,
            })
    }

    pub fn resident_bytes_for(&self, storage: &Storage) -> Result<usize> {
        self.resident_bytes(storage.elements(), storage.element_width())
    }
}
