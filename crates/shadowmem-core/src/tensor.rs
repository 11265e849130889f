//! Logical values: a shaped, typed window onto a `Storage`.

use crate::buffer::Storage;
use crate::dtype::DType;
use crate::error::Result;
use crate::id::BufferId;
use crate::shape::Shape;

#[derive(Debug, Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: Vec<usize>,
    offset: usize,
    dtype: DType,
}

impl Tensor {
    /// Allocate a new contiguous tensor backed by its own buffer.
    pub fn empty(shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        let storage = Storage::new(shape.numel()?, dtype)?;
        let strides = shape.contiguous_strides();
        Ok(Self {
            storage,
            shape,
            strides,
            offset: 0,
            dtype,
        })
    }

    /// A view sharing this tensor's buffer with a different layout.
    pub fn alias(&self, shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        debug_assert_eq!(shape.rank(), strides.len());
        Self {
            storage: self.storage.clone(),
            shape,
            strides,
            offset,
            dtype: self.dtype,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn buffer_id(&self) -> BufferId {
        self.storage.id()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> Result<usize> {
        self.shape.numel()
    }

    /// Whether this view shares its buffer with `other`.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        self.storage == other.storage
    }

    pub fn is_contiguous(&self) -> bool {
        let expected = self.shape.contiguous_strides();
        self.shape
            .dims()
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (&s, &e))| d <= 1 || s == e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allocates_numel_elements() {
        let t = Tensor::empty([3, 5], DType::F16).unwrap();
        assert_eq!(t.storage().elements(), 15);
        assert_eq!(t.storage().nbytes(), 30);
        assert!(t.is_contiguous());
    }

    #[test]
    fn alias_shares_buffer() {
        let t = Tensor::empty([2, 3], DType::F32).unwrap();
        let v = t.alias(Shape::from([3, 2]), vec![1, 3], 0);
        assert!(v.shares_storage(&t));
        assert_eq!(v.buffer_id(), t.buffer_id());
        assert!(!v.is_contiguous());
        assert_eq!(t.storage().strong_count(), 2);
    }
}
