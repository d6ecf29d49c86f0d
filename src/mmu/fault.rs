//! Page-fault and swap handling
//!
//! [`PageFrame`] is the per-frame metadata table (the reverse mapping side
//! of the MMU): which virtual page owns the frame, whether it has been
//! written since it was brought in, its LRU stamp, and the permanent swap
//! slot backing it.
//!
//! The fault handler claims a frame in strict preference order - free,
//! oldest clean, oldest overall with write-back - and updates the forward
//! (leaf entry) and reverse (frame) mappings together. A frame whose owner
//! does not map it back is a simulator bug and panics.

use super::address::VirtAddr;
use super::page_table::LeafEntry;
use super::Mmu;
use crate::cache::SramCache;
use crate::constants::PAGE_SIZE;
use crate::errors::MemoryError;
use crate::memory::dram::PhysicalMemory;
use crate::memory::swap::SwapStore;
use log::debug;

/// Metadata for one physical page frame
#[derive(Debug, Clone, Copy, Default)]
pub struct PageFrame {
    /// Whether some virtual page currently occupies the frame
    pub allocated: bool,
    /// Written since it was brought in (write-back needed on eviction)
    pub dirty: bool,
    /// LRU stamp: the MMU clock at the last access
    pub time: u64,
    /// Virtual page number of the current tenant
    pub owner: Option<u64>,
    /// Permanent swap slot of the current tenant
    pub swap_addr: Option<u64>,
}

impl Mmu {
    /// Resolve a not-present leaf: claim a frame, page the contents in, and
    /// install the forward and reverse mappings. On return the leaf for
    /// `vaddr` is `Mapped`.
    pub(super) fn handle_page_fault(
        &mut self,
        vaddr: VirtAddr,
        pm: &mut PhysicalMemory,
        swap: &mut SwapStore,
        cache: &mut SramCache,
    ) -> Result<(), MemoryError> {
        let page = vaddr.page_number();
        let backing = match *self.leaf_for_page(page) {
            LeafEntry::Untouched => None,
            LeafEntry::Swapped { swap_addr } => Some(swap_addr),
            LeafEntry::Mapped { .. } => panic!("page fault on mapped page 0x{:x}", page),
        };

        let ppn = self.choose_victim();
        let victim = self.page_map[ppn];
        if victim.allocated {
            self.evict_frame(ppn, victim, pm, swap, cache)?;
        }

        // bring the faulting page into the claimed frame
        let swap_addr = match backing {
            Some(swap_addr) => {
                swap.swap_in(swap_addr, ppn as u64, pm)?;
                debug!("page-in disk {} -> frame {}", swap_addr, ppn);
                swap_addr
            }
            None => {
                // first touch: zero-filled page, fresh permanent slot
                pm.fill(ppn as u64 * PAGE_SIZE, PAGE_SIZE, 0);
                let swap_addr = swap.alloc_slot();
                debug!("first touch of page 0x{:x} in frame {}", page, ppn);
                swap_addr
            }
        };

        // forward and reverse mappings change together
        *self.leaf_for_page(page) = LeafEntry::Mapped {
            ppn: ppn as u64,
            dirty: false,
        };
        self.page_map[ppn] = PageFrame {
            allocated: true,
            dirty: false,
            time: self.clock,
            owner: Some(page),
            swap_addr: Some(swap_addr),
        };
        Ok(())
    }

    /// Push the current tenant of `ppn` out to its swap slot and invalidate
    /// its forward mapping and TLB entry
    fn evict_frame(
        &mut self,
        ppn: usize,
        victim: PageFrame,
        pm: &mut PhysicalMemory,
        swap: &mut SwapStore,
        cache: &mut SramCache,
    ) -> Result<(), MemoryError> {
        let owner = victim
            .owner
            .unwrap_or_else(|| panic!("allocated frame {} has no owner", ppn));
        let swap_addr = victim
            .swap_addr
            .unwrap_or_else(|| panic!("allocated frame {} has no swap slot", ppn));

        // dirty SRAM lines are the authoritative copy of the frame; fold
        // them into DRAM before swap_out reads it directly
        cache.flush_page(ppn as u64, pm);
        if victim.dirty {
            swap.swap_out(swap_addr, ppn as u64, pm)?;
            debug!("page-out frame {} -> disk {}", ppn, swap_addr);
        } else {
            debug!("evict clean frame {} (page 0x{:x})", ppn, owner);
        }

        let leaf = self.leaf_for_page(owner);
        match *leaf {
            LeafEntry::Mapped { ppn: mapped, .. } if mapped == ppn as u64 => {
                *leaf = LeafEntry::Swapped { swap_addr };
            }
            other => panic!(
                "reverse mapping desync: frame {} owner 0x{:x} holds {:?}",
                ppn, owner, other
            ),
        }
        self.tlb.invalidate(owner);
        self.page_map[ppn] = PageFrame::default();
        Ok(())
    }

    /// Pick the frame to claim: free, else oldest clean, else oldest
    fn choose_victim(&self) -> usize {
        if let Some(ppn) = self.page_map.iter().position(|f| !f.allocated) {
            return ppn;
        }
        if let Some(ppn) = self
            .page_map
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.dirty)
            .min_by_key(|(_, f)| f.time)
            .map(|(ppn, _)| ppn)
        {
            return ppn;
        }
        self.page_map
            .iter()
            .enumerate()
            .min_by_key(|(_, f)| f.time)
            .map(|(ppn, _)| ppn)
            .unwrap_or_else(|| panic!("no page frames configured"))
    }
}
