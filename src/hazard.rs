//! Per-buffer hazard tracking
//!
//! A buffer holds at most one outstanding completion event: the marker of
//! the most recent operation that read or wrote it. New operations on the
//! buffer wait on that event and then install their own.
//!
//! Only the latest event is kept. Fan-out patterns (many readers of one
//! buffer in flight at once) are serialized through that single slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{GpuError, Result};

type Slot<E> = Mutex<Option<E>>;

fn lock<E>(slot: &Slot<E>) -> MutexGuard<'_, Option<E>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hazard slot owned by a buffer
///
/// State is either empty or holding one event. Dropping it releases the
/// held event.
#[derive(Debug)]
pub struct Hazard<E> {
    slot: Arc<Slot<E>>,
}

impl<E: Clone> Hazard<E> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Copy of the outstanding event, if any.
    pub fn current(&self) -> Option<E> {
        lock(&self.slot).clone()
    }

    /// Remove and return the outstanding event.
    pub fn take(&self) -> Option<E> {
        lock(&self.slot).take()
    }

    /// Install `event`, returning the superseded one.
    pub fn install(&self, event: E) -> Option<E> {
        lock(&self.slot).replace(event)
    }

    /// Drop the outstanding event.
    pub fn clear(&self) {
        self.take();
    }

    pub fn is_held(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Second owner of the same slot, for another handle on the same
    /// allocation. The slot lives until its last owner is dropped.
    pub fn share(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Weak reference that does not keep the slot alive.
    pub fn downgrade(&self) -> HazardRef<E> {
        HazardRef {
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// Put back an event taken for a launch that never reached the device,
    /// unless something newer was installed meanwhile.
    fn restore(&self, event: E) {
        let mut slot = lock(&self.slot);
        if slot.is_none() {
            *slot = Some(event);
        }
    }

    fn ptr_eq(&self, other: &Hazard<E>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<E: Clone> Default for Hazard<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning reference to a buffer's hazard slot
#[derive(Debug)]
pub struct HazardRef<E> {
    slot: Weak<Slot<E>>,
}

impl<E> Clone for HazardRef<E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<E: Clone> HazardRef<E> {
    /// The slot, if its buffer has not been freed.
    pub fn upgrade(&self) -> Option<Hazard<E>> {
        self.slot.upgrade().map(|slot| Hazard { slot })
    }
}

/// Table of buffer references, one per kernel parameter
///
/// Used only to find hazards at dispatch time; it never owns the buffers.
#[derive(Debug)]
pub struct BufferTable<E> {
    slots: Vec<Option<HazardRef<E>>>,
}

impl<E: Clone> BufferTable<E> {
    pub fn new(num_args: usize) -> Self {
        Self {
            slots: vec![None; num_args],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.slots.len() {
            return Err(GpuError::invalid(format!(
                "argument index {} out of range (kernel takes {})",
                index,
                self.slots.len()
            )));
        }
        Ok(())
    }

    /// Record `hazard` as the buffer bound at `index`.
    pub fn bind(&mut self, index: usize, hazard: &Hazard<E>) -> Result<()> {
        self.check_index(index)?;
        self.slots[index] = Some(hazard.downgrade());
        Ok(())
    }

    /// Forget the buffer at `index`, e.g. when a scalar is bound there.
    pub fn unbind(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Number of slots whose buffer is still alive.
    pub fn live_buffers(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|r| r.upgrade().is_some())
            .count()
    }

    /// Consume the outstanding hazards of every live bound buffer.
    ///
    /// Each buffer's slot is cleared and its event moved into the wait list.
    /// A buffer bound at several indices is visited once.
    pub fn acquire(&self) -> PendingLaunch<E> {
        let mut buffers: Vec<Hazard<E>> = Vec::new();
        let mut taken = Vec::new();

        for hazard in self.slots.iter().flatten().filter_map(HazardRef::upgrade) {
            if buffers.iter().any(|h| h.ptr_eq(&hazard)) {
                continue;
            }
            if let Some(event) = hazard.take() {
                taken.push((buffers.len(), event));
            }
            buffers.push(hazard);
        }

        log::trace!(
            "Launch acquires {} buffers, waits on {} events",
            buffers.len(),
            taken.len()
        );
        PendingLaunch { buffers, taken }
    }
}

/// Hazards consumed by a launch that has not been committed yet
#[derive(Debug)]
pub struct PendingLaunch<E: Clone> {
    buffers: Vec<Hazard<E>>,
    taken: Vec<(usize, E)>,
}

impl<E: Clone> PendingLaunch<E> {
    /// Events the launch must wait on.
    pub fn wait_list(&self) -> Vec<E> {
        self.taken.iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// The launch was enqueued: every bound buffer now holds `event`.
    /// The consumed events are released.
    pub fn commit(self, event: E) {
        for hazard in &self.buffers {
            hazard.install(event.clone());
        }
    }

    /// The launch failed: give the consumed events back to their buffers.
    pub fn abort(self) {
        for (index, event) in self.taken {
            self.buffers[index].restore(event);
        }
    }
}
