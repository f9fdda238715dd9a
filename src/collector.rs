//! Resolves dispatched handles into an index-aligned result set.

use tracing::{debug, warn};

use crate::dispatcher::Dispatched;
use crate::error::SlotError;
use crate::types::{Slot, SlotIndex};

/// One slot per dispatched task, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    slots: Vec<Slot>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[allow(dead_code)]
    pub fn get(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Successful results, skipping error markers.
    #[allow(dead_code)]
    pub fn values(&self) -> Vec<i32> {
        self.slots.iter().filter_map(|slot| slot.as_ref().ok().copied()).collect()
    }

    pub fn failures(&self) -> Vec<(SlotIndex, &SlotError)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().err().map(|e| (index, e)))
            .collect()
    }
}

/// Wait for every handle in index order and return the populated set.
pub fn collect(dispatched: Dispatched) -> ResultSet {
    let (handles, pool) = dispatched.into_parts();
    let mut slots = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let slot = handle.resolve();
        match &slot {
            Ok(value) => debug!(index, value, "slot resolved"),
            Err(e) => warn!(index, error = %e, "slot failed"),
        }
        slots.push(slot);
    }
    if let Some(pool) = pool {
        pool.shutdown();
    }
    ResultSet { slots }
}
