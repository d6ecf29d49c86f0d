//! Page-granular backing storage
//!
//! [`SwapStore`] stands in for the swap partition: a map from opaque disk
//! addresses to page images, one page per unit. The fault handler allocates
//! a permanent slot for every virtual page the first time it materializes,
//! so a slot that has never been written back reads as zeros.
//!
//! Disk addresses are opaque tickets handed out by [`SwapStore::alloc_slot`];
//! using an address the store never issued is a recoverable error, not a
//! panic - the caller decides whether a missing page is fatal.

use crate::constants::PAGE_SIZE;
use crate::errors::MemoryError;
use crate::memory::dram::PhysicalMemory;
use rustc_hash::FxHashMap;

/// In-memory swap device
#[derive(Debug, Clone, Default)]
pub struct SwapStore {
    pages: FxHashMap<u64, Box<[u8]>>,
    next_daddr: u64,
}

impl SwapStore {
    pub fn new() -> Self {
        SwapStore {
            pages: FxHashMap::default(),
            next_daddr: 0,
        }
    }

    /// Reserve a fresh slot and return its disk address.
    /// The slot starts out as a zero page.
    pub fn alloc_slot(&mut self) -> u64 {
        let daddr = self.next_daddr;
        self.next_daddr += 1;
        self.pages.insert(daddr, vec![0; PAGE_SIZE as usize].into());
        daddr
    }

    /// Number of slots currently reserved
    pub fn slot_count(&self) -> usize {
        self.pages.len()
    }

    /// Copy the page at `daddr` into physical frame `ppn`
    pub fn swap_in(
        &self,
        daddr: u64,
        ppn: u64,
        pm: &mut PhysicalMemory,
    ) -> Result<(), MemoryError> {
        let page = self
            .pages
            .get(&daddr)
            .ok_or(MemoryError::SwapReadFailed { disk_address: daddr })?;
        pm.write_block(ppn * PAGE_SIZE, page);
        Ok(())
    }

    /// Copy physical frame `ppn` out to the page at `daddr`
    pub fn swap_out(
        &mut self,
        daddr: u64,
        ppn: u64,
        pm: &PhysicalMemory,
    ) -> Result<(), MemoryError> {
        let page = self
            .pages
            .get_mut(&daddr)
            .ok_or(MemoryError::SwapWriteFailed { disk_address: daddr })?;
        pm.read_block(ppn * PAGE_SIZE, page);
        Ok(())
    }
}
