//! Live allocation registry.
//!
//! Maps buffer identity to a *weak* handle plus the buffer's resident size.
//! Entries are removed by a release observer armed on the buffer itself, so
//! the registry never decides liveness and never extends it. The buffer only
//! holds the registry weakly; a dropped registry is pruned from long-lived
//! buffers the next time anything arms on them.
//!
//! All mutations and peak updates happen under one mutex. The registry never
//! upgrades a weak handle, so a buffer can never be freed while that mutex is
//! held, and a release notification can always take it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use shadowmem_core::buffer::{ReleaseObserver, Storage, WeakStorage};
use shadowmem_core::id::BufferId;

use crate::error::Result;
use crate::sizing::AlignmentPolicy;
use crate::tracking::PeakTracker;

/// One live buffer as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveBuffer {
    pub id: BufferId,
    pub resident_bytes: usize,
}

struct RegistryEntry {
    handle: WeakStorage,
    resident_bytes: usize,
}

type EntryMap = HashMap<BufferId, RegistryEntry>;

struct RegistryInner {
    policy: AlignmentPolicy,
    entries: Mutex<EntryMap>,
    peak: Arc<PeakTracker>,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, EntryMap> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn total(entries: &EntryMap) -> usize {
        entries
            .values()
            .fold(0usize, |acc, e| acc.saturating_add(e.resident_bytes))
    }

    fn recompute_locked(&self, entries: &EntryMap) -> usize {
        let total = Self::total(entries);
        self.peak.observe(total);
        total
    }

    /// Absent ids are a benign no-op.
    fn release(&self, id: BufferId) {
        let mut entries = self.entries();
        let Some(_entry) = entries.remove(&id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(%id, "release for untracked buffer ignored");
            return;
        };
        let _total = self.recompute_locked(&entries);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            %id,
            resident_bytes = _entry.resident_bytes,
            live_bytes = _total,
            "buffer released"
        );
    }
}

impl ReleaseObserver for RegistryInner {
    fn released(&self, id: BufferId) {
        self.release(id);
    }
}

/// Shared handle to a live-allocation registry. Clones see the same entries.
#[derive(Clone)]
pub struct LiveRegistry {
    inner: Arc<RegistryInner>,
}

impl LiveRegistry {
    /// Registry feeding its own fresh peak tracker.
    pub fn new(policy: AlignmentPolicy) -> Self {
        Self::with_peak(policy, Arc::new(PeakTracker::new()))
    }

    /// Registry feeding an existing peak tracker.
    pub fn with_peak(policy: AlignmentPolicy, peak: Arc<PeakTracker>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                policy,
                entries: Mutex::new(HashMap::new()),
                peak,
            }),
        }
    }

    pub fn policy(&self) -> AlignmentPolicy {
        self.inner.policy
    }

    pub fn peak_tracker(&self) -> &Arc<PeakTracker> {
        &self.inner.peak
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.current_peak()
    }

    /// Idempotent insert. Returns `Ok(true)` if the buffer was not yet tracked.
    ///
    /// On insert, stores a weak handle, arms a release observer on the buffer,
    /// and recomputes the live total. Sizing failures leave the registry
    /// untouched.
    pub fn register(&self, storage: &Storage) -> Result<bool> {
        let id = storage.id();
        let resident_bytes = self.inner.policy.resident_bytes_for(storage)?;

        let mut entries = self.inner.entries();
        if entries.contains_key(&id) {
            return Ok(false);
        }
        entries.insert(
            id,
            RegistryEntry {
                handle: storage.downgrade(),
                resident_bytes,
            },
        );

        let observer: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let observer: Weak<dyn ReleaseObserver> = observer;
        storage.on_release(observer);

        let _total = self.inner.recompute_locked(&entries);
        #[cfg(feature = "tracing")]
        tracing::debug!(%id, resident_bytes, live_bytes = _total, "buffer registered");
        Ok(true)
    }

    /// Sum of resident bytes over every tracked buffer.
    pub fn total_resident_bytes(&self) -> usize {
        RegistryInner::total(&self.inner.entries())
    }

    /// Recompute the live total and report it to the peak tracker.
    pub fn recompute(&self) -> usize {
        let entries = self.inner.entries();
        self.inner.recompute_locked(&entries)
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.inner.entries().contains_key(&id)
    }

    /// Every tracked buffer, ordered by id.
    pub fn live_buffers(&self) -> Vec<LiveBuffer> {
        let entries = self.inner.entries();
        let mut out: Vec<LiveBuffer> = entries
            .iter()
            .filter(|(_, e)| e.handle.is_alive())
            .map(|(&id, e)| LiveBuffer {
                id,
                resident_bytes: e.resident_bytes,
            })
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }
}

impl std::fmt::Debug for LiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.entries();
        f.debug_struct("LiveRegistry")
            .field("align", &self.inner.policy.align())
            .field("live", &entries.len())
            .field("live_bytes", &RegistryInner::total(&entries))
            .field("peak", &self.inner.peak.current_peak())
            .finish()
    }
}
