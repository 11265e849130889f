//! Backing buffers.
//!
//! A `Storage` stands in for a device allocation. It carries identity, an
//! element count and a dtype, but no data. Views share one `Storage`; the
//! buffer goes away when the last strong handle drops, at which point every
//! armed release observer that is still alive is notified exactly once.
//! Observers are held weakly, so a buffer that outlives its observers never
//! keeps them (or their callbacks) around.
//!
//! `WeakStorage` is the non-owning side. Holding one never extends the
//! lifetime of the buffer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::id::BufferId;

/// Notified when a buffer it was armed on is released.
pub trait ReleaseObserver: Send + Sync {
    fn released(&self, id: BufferId);
}

struct StorageInner {
    id: BufferId,
    elements: usize,
    dtype: DType,
    nbytes: usize,
    observers: Mutex<Vec<Weak<dyn ReleaseObserver>>>,
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        let observers = std::mem::take(
            self.observers
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for observer in observers.iter().filter_map(Weak::upgrade) {
            observer.released(self.id);
        }
    }
}

/// Strong handle to a backing buffer. Cloning shares the same buffer.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl Storage {
    /// Allocate a fresh (data-less) buffer for `elements` items of `dtype`.
    pub fn new(elements: usize, dtype: DType) -> Result<Self> {
        let width = dtype.size_in_bytes();
        let nbytes = elements
            .checked_mul(width)
            .ok_or(Error::SizeOverflow { elements, width })?;
        Ok(Self {
            inner: Arc::new(StorageInner {
                id: BufferId::next(),
                elements,
                dtype,
                nbytes,
                observers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn elements(&self) -> usize {
        self.inner.elements
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn element_width(&self) -> usize {
        self.inner.dtype.size_in_bytes()
    }

    /// Unaligned size: `elements * element_width`.
    pub fn nbytes(&self) -> usize {
        self.inner.nbytes
    }

    /// Number of strong handles currently keeping this buffer alive.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakStorage {
        WeakStorage {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Arm `observer` to be notified when the last strong handle is dropped.
    ///
    /// Observers that have already gone away are pruned here, so a
    /// long-lived buffer holds at most one slot per observer still alive.
    pub fn on_release(&self, observer: Weak<dyn ReleaseObserver>) {
        let mut observers = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| o.strong_count() > 0);
        observers.push(observer);
    }

    /// Number of release observers currently armed on this buffer.
    pub fn armed_observers(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PartialEq for Storage {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Storage {}

impl Hash for Storage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("id", &self.inner.id)
            .field("elements", &self.inner.elements)
            .field("dtype", &self.inner.dtype)
            .field("nbytes", &self.inner.nbytes)
            .finish()
    }
}

/// Non-owning observation of a `Storage`.
#[derive(Clone)]
pub struct WeakStorage {
    id: BufferId,
    inner: Weak<StorageInner>,
}

impl WeakStorage {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStorage")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
