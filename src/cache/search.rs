//! Per-session table of active directory searches.
//!
//! READDIR cookies carry a slot id in their upper byte, so the table is
//! a fixed array of 256 slots. Allocation and deallocation serialize on
//! the table lock; each occupied slot hands out an `Arc`-shared mutex
//! around its [`SearchContext`], so two requests advancing different
//! searches never contend. A request that looks up a slot which has
//! been deallocated in the meantime simply restarts its search, which
//! is the documented resolution of that race.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as SlotMutex;

use crate::driver::SearchContext;

/// Number of slots; the cookie format has one byte for the slot id.
pub const SEARCH_SLOT_COUNT: usize = 256;

/// A shared handle on one active search.
pub type SearchRef = Arc<SlotMutex<Box<dyn SearchContext>>>;

/// Returned when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTableFull;

impl fmt::Display for SlotTableFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no free search slot")
    }
}

impl std::error::Error for SlotTableFull {}

/// Search slot table for one session.
pub struct SearchSlotTable {
    slots: Mutex<Vec<Option<SearchRef>>>,
}

impl SearchSlotTable {
    pub fn new() -> Self {
        Self { slots: Mutex::new((0..SEARCH_SLOT_COUNT).map(|_| None).collect()) }
    }

    /// Stores `context` in the lowest free slot and returns its id.
    pub fn allocate(&self, context: Box<dyn SearchContext>) -> Result<u8, SlotTableFull> {
        let mut slots = self.slots.lock().expect("search table poisoned");
        let free = slots.iter().position(Option::is_none).ok_or(SlotTableFull)?;
        slots[free] = Some(Arc::new(SlotMutex::new(context)));
        Ok(free as u8)
    }

    /// Shared reference to the search in `slot`, if still allocated.
    pub fn get(&self, slot: u8) -> Option<SearchRef> {
        self.slots.lock().expect("search table poisoned")[slot as usize].clone()
    }

    /// Frees `slot`, returning the search for closing.
    pub fn deallocate(&self, slot: u8) -> Option<SearchRef> {
        self.slots.lock().expect("search table poisoned")[slot as usize].take()
    }

    /// Frees every slot, returning the searches for closing. Used on
    /// session teardown.
    pub fn drain(&self) -> Vec<SearchRef> {
        let mut slots = self.slots.lock().expect("search table poisoned");
        slots.iter_mut().filter_map(Option::take).collect()
    }
}

impl Default for SearchSlotTable {
    fn default() -> Self {
        Self::new()
    }
}
