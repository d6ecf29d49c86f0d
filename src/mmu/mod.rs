//! Virtual-to-physical address translation
//!
//! The translation pipeline, consulted in order:
//! 1. [`tlb`] - a small set-associative cache of recent translations
//! 2. [`page_table`] - the 4-level radix walk, creating interior tables
//!    lazily on first descent
//! 3. [`fault`] - the page-fault handler, which claims a frame (evicting
//!    to swap when none is free) and installs the missing mapping
//!
//! [`Mmu`] owns the root table (the simulated CR3), the per-frame metadata
//! table and the TLB. Translation never fails for lack of frames - the
//! fault handler always finds a victim - so errors surface only from the
//! backing store.

pub mod address;
pub mod fault;
pub mod page_table;
pub mod tlb;

use crate::cache::SramCache;
use crate::constants::{NUM_PAGE_FRAMES, PAGE_TABLE_LEVELS, VPN_BITS_PER_LEVEL};
use crate::errors::MemoryError;
use crate::memory::dram::PhysicalMemory;
use crate::memory::swap::SwapStore;
use address::{PhysAddr, VirtAddr};
use fault::PageFrame;
use log::trace;
use page_table::{LeafEntry, PageTable, PageTableEntry};

/// Kind of memory access being translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Outcome of one page-table walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkOutcome {
    /// The leaf maps a frame
    Present(u64),
    /// The leaf is untouched or swapped out: a true page fault
    Fault,
}

/// The memory-management unit
pub struct Mmu {
    root: PageTable,
    page_map: Vec<PageFrame>,
    tlb: tlb::Tlb,
    clock: u64,
}

impl Mmu {
    pub fn new() -> Self {
        Mmu {
            root: PageTable::new(),
            page_map: vec![PageFrame::default(); NUM_PAGE_FRAMES],
            tlb: tlb::Tlb::new(),
            clock: 0,
        }
    }

    /// Metadata for one physical frame (diagnostics and tests)
    pub fn frame(&self, ppn: usize) -> &PageFrame {
        &self.page_map[ppn]
    }

    /// Number of frames currently occupied
    pub fn frames_in_use(&self) -> usize {
        self.page_map.iter().filter(|f| f.allocated).count()
    }

    /// Translate a virtual address, faulting the page in if needed.
    /// The TLB is consulted first and refreshed unconditionally after any
    /// walk.
    pub fn translate(
        &mut self,
        vaddr: VirtAddr,
        access: Access,
        pm: &mut PhysicalMemory,
        swap: &mut SwapStore,
        cache: &mut SramCache,
    ) -> Result<u64, MemoryError> {
        self.clock += 1;

        let probe = self.tlb.lookup(vaddr);
        if let Some(ppn) = probe.ppn {
            let frame = &mut self.page_map[ppn as usize];
            debug_assert!(frame.allocated, "TLB maps an unallocated frame");
            frame.time = self.clock;
            if access == Access::Write {
                frame.dirty = true;
            }
            return Ok(PhysAddr::from_parts(ppn, vaddr.page_offset()).0);
        }

        let ppn = match self.walk(vaddr, access) {
            WalkOutcome::Present(ppn) => ppn,
            WalkOutcome::Fault => {
                trace!("page fault at 0x{:x}", vaddr.0);
                self.handle_page_fault(vaddr, pm, swap, cache)?;
                // the handler must have left the leaf mapped
                match self.walk(vaddr, access) {
                    WalkOutcome::Present(ppn) => ppn,
                    WalkOutcome::Fault => panic!(
                        "fault handler left page 0x{:x} unmapped",
                        vaddr.page_number()
                    ),
                }
            }
        };

        let frame = &mut self.page_map[ppn as usize];
        frame.time = self.clock;
        if access == Access::Write {
            frame.dirty = true;
        }
        self.tlb.install(vaddr, ppn, probe.free_way);
        Ok(PhysAddr::from_parts(ppn, vaddr.page_offset()).0)
    }

    /// Walk the four levels for `vaddr`, creating interior tables (and an
    /// untouched leaf) on the way down. Marks the leaf dirty on a present
    /// write.
    fn walk(&mut self, vaddr: VirtAddr, access: Access) -> WalkOutcome {
        let mut table = &mut self.root;
        for level in 1..PAGE_TABLE_LEVELS {
            table = table.child_or_create(vaddr.vpn(level));
        }
        let leaf = table.leaf_or_create(vaddr.vpn(PAGE_TABLE_LEVELS));
        match leaf {
            LeafEntry::Mapped { ppn, dirty } => {
                if access == Access::Write {
                    *dirty = true;
                }
                WalkOutcome::Present(*ppn)
            }
            LeafEntry::Untouched | LeafEntry::Swapped { .. } => WalkOutcome::Fault,
        }
    }

    /// The leaf entry for a virtual page whose path already exists.
    /// A missing path here means the reverse mapping points at a page the
    /// tree never saw - a simulator bug.
    fn leaf_for_page(&mut self, virtual_page: u64) -> &mut LeafEntry {
        let mut table = &mut self.root;
        for level in 1..PAGE_TABLE_LEVELS {
            let index = Self::vpn_of(virtual_page, level);
            table = match table.entry_mut(index) {
                PageTableEntry::Table(child) => &mut **child,
                _ => panic!(
                    "page 0x{:x}: no interior table at level {}",
                    virtual_page, level
                ),
            };
        }
        let index = Self::vpn_of(virtual_page, PAGE_TABLE_LEVELS);
        match table.entry_mut(index) {
            PageTableEntry::Leaf(leaf) => leaf,
            _ => panic!("page 0x{:x}: no leaf entry", virtual_page),
        }
    }

    /// The level index a virtual page number uses at `level`
    fn vpn_of(virtual_page: u64, level: usize) -> usize {
        let shift = (PAGE_TABLE_LEVELS - level) as u32 * VPN_BITS_PER_LEVEL;
        ((virtual_page >> shift) & ((1 << VPN_BITS_PER_LEVEL) - 1)) as usize
    }

    /// Interior tables reachable under the root for a virtual page, per
    /// level (diagnostics and tests)
    pub fn table_path_depth(&self, virtual_page: u64) -> usize {
        let mut depth = 0;
        let mut table = &self.root;
        for level in 1..PAGE_TABLE_LEVELS {
            match table.child(Self::vpn_of(virtual_page, level)) {
                Some(child) => {
                    depth += 1;
                    table = child;
                }
                None => return depth,
            }
        }
        match table.entry(Self::vpn_of(virtual_page, PAGE_TABLE_LEVELS)) {
            PageTableEntry::Leaf(_) => depth + 1,
            _ => depth,
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PAGE_SIZE, PHYSICAL_MEMORY_SIZE};

    fn rig() -> (Mmu, PhysicalMemory, SwapStore, SramCache) {
        (
            Mmu::new(),
            PhysicalMemory::new(PHYSICAL_MEMORY_SIZE),
            SwapStore::new(),
            SramCache::new(),
        )
    }

    #[test]
    fn test_translate_is_stable_without_eviction() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        let va = VirtAddr(0x7f00_1234);
        let p1 = mmu
            .translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        let p2 = mmu
            .translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(p1, p2);
        assert_eq!(p1 & 0xfff, 0x234);
    }

    #[test]
    fn test_lazy_interior_tables_are_shared_by_siblings() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        let va = VirtAddr(0x40_0000_0000);
        assert_eq!(mmu.table_path_depth(va.page_number()), 0);

        mmu.translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(mmu.table_path_depth(va.page_number()), 4);

        // a sibling page under the same level-1 entry reuses the path
        let sibling = VirtAddr(0x40_0000_1000);
        assert_eq!(mmu.table_path_depth(sibling.page_number()), 3);
        mmu.translate(sibling, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(mmu.table_path_depth(sibling.page_number()), 4);
        assert_eq!(mmu.frames_in_use(), 2);
    }

    #[test]
    fn test_fault_fills_frames_before_evicting() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        for i in 0..NUM_PAGE_FRAMES as u64 {
            let va = VirtAddr(i * PAGE_SIZE);
            mmu.translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
                .expect("translate failed");
        }
        assert_eq!(mmu.frames_in_use(), NUM_PAGE_FRAMES);

        // one more page forces an eviction; occupancy stays full
        let va = VirtAddr(NUM_PAGE_FRAMES as u64 * PAGE_SIZE);
        mmu.translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(mmu.frames_in_use(), NUM_PAGE_FRAMES);
    }

    #[test]
    fn test_eviction_prefers_clean_lru_victim() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        // fill memory; dirty every page except page 3
        for i in 0..NUM_PAGE_FRAMES as u64 {
            let va = VirtAddr(i * PAGE_SIZE);
            let access = if i == 3 { Access::Read } else { Access::Write };
            mmu.translate(va, access, &mut pm, &mut swap, &mut cache)
                .expect("translate failed");
        }
        let clean_frame = {
            let va = VirtAddr(3 * PAGE_SIZE);
            mmu.translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
                .expect("translate failed")
                >> 12
        };

        // the clean page is the only eviction candidate of its class
        let newcomer = VirtAddr(0x9000_0000);
        let got = mmu
            .translate(newcomer, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed")
            >> 12;
        assert_eq!(got, clean_frame);
    }

    #[test]
    fn test_evicted_page_returns_on_a_frame_with_same_offset_bits() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        let va = VirtAddr(0x1234);
        let before = mmu
            .translate(va, Access::Write, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");

        // push enough fresh pages through to evict va's frame
        for i in 1..=NUM_PAGE_FRAMES as u64 {
            let other = VirtAddr(0x8000_0000 + i * PAGE_SIZE);
            mmu.translate(other, Access::Write, &mut pm, &mut swap, &mut cache)
                .expect("translate failed");
        }

        let after = mmu
            .translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(before & 0xfff, after & 0xfff);
        assert_ne!(before, after, "frame should have been recycled");
    }

    #[test]
    fn test_dirty_page_survives_eviction_round_trip() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        let va = VirtAddr(0x5000);
        let paddr = mmu
            .translate(va, Access::Write, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        pm.write_byte(paddr, 0x77);

        // evict it by touching more pages than there are frames
        for i in 0..=NUM_PAGE_FRAMES as u64 {
            let other = VirtAddr(0x8000_0000 + i * PAGE_SIZE);
            mmu.translate(other, Access::Write, &mut pm, &mut swap, &mut cache)
                .expect("translate failed");
        }

        let back = mmu
            .translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        assert_eq!(pm.read_byte(back), 0x77);
    }

    #[test]
    fn test_reverse_mapping_tracks_owner() {
        let (mut mmu, mut pm, mut swap, mut cache) = rig();
        let va = VirtAddr(0xabc_d000);
        let paddr = mmu
            .translate(va, Access::Read, &mut pm, &mut swap, &mut cache)
            .expect("translate failed");
        let frame = mmu.frame((paddr >> 12) as usize);
        assert!(frame.allocated);
        assert_eq!(frame.owner, Some(va.page_number()));
        assert!(frame.swap_addr.is_some());
    }
}
