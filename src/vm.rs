//! The assembled memory hierarchy
//!
//! [`VirtualMemory`] wires the pipeline together the way the CPU core
//! consumes it: every access translates its virtual address (TLB -> page
//! walk -> fault handler) and then moves bytes through the SRAM cache,
//! which talks to DRAM on a miss. This is the narrow interface the
//! out-of-scope instruction cycle sees: byte and little-endian word
//! reads/writes at virtual addresses, plus `translate` itself.

use crate::cache::SramCache;
use crate::constants::PHYSICAL_MEMORY_SIZE;
use crate::errors::MemoryError;
use crate::memory::dram::PhysicalMemory;
use crate::memory::swap::SwapStore;
use crate::mmu::address::VirtAddr;
use crate::mmu::{Access, Mmu};

/// Demand-paged virtual memory with an SRAM cache in front of DRAM
pub struct VirtualMemory {
    mmu: Mmu,
    cache: SramCache,
    dram: PhysicalMemory,
    swap: SwapStore,
}

impl VirtualMemory {
    pub fn new() -> Self {
        VirtualMemory {
            mmu: Mmu::new(),
            cache: SramCache::new(),
            dram: PhysicalMemory::new(PHYSICAL_MEMORY_SIZE),
            swap: SwapStore::new(),
        }
    }

    /// Translate a virtual address for a read access
    pub fn translate(&mut self, vaddr: u64) -> Result<u64, MemoryError> {
        self.mmu.translate(
            VirtAddr(vaddr),
            Access::Read,
            &mut self.dram,
            &mut self.swap,
            &mut self.cache,
        )
    }

    /// Read one byte at a virtual address
    pub fn read_byte(&mut self, vaddr: u64) -> Result<u8, MemoryError> {
        let paddr = self.mmu.translate(
            VirtAddr(vaddr),
            Access::Read,
            &mut self.dram,
            &mut self.swap,
            &mut self.cache,
        )?;
        Ok(self.cache.read_byte(paddr, &mut self.dram))
    }

    /// Write one byte at a virtual address
    pub fn write_byte(&mut self, vaddr: u64, value: u8) -> Result<(), MemoryError> {
        let paddr = self.mmu.translate(
            VirtAddr(vaddr),
            Access::Write,
            &mut self.dram,
            &mut self.swap,
            &mut self.cache,
        )?;
        self.cache.write_byte(paddr, value, &mut self.dram);
        Ok(())
    }

    /// Read a little-endian 64-bit word at a virtual address.
    /// Byte-by-byte, so the word may straddle a page boundary.
    pub fn read_u64(&mut self, vaddr: u64) -> Result<u64, MemoryError> {
        let mut value: u64 = 0;
        for i in 0..8 {
            value |= (self.read_byte(vaddr + i)? as u64) << (8 * i);
        }
        Ok(value)
    }

    /// Write a little-endian 64-bit word at a virtual address
    pub fn write_u64(&mut self, vaddr: u64, value: u64) -> Result<(), MemoryError> {
        for i in 0..8 {
            self.write_byte(vaddr + i, ((value >> (8 * i)) & 0xff) as u8)?;
        }
        Ok(())
    }

    /// Write all dirty cache lines back to DRAM
    pub fn flush_cache(&mut self) {
        self.cache.flush_all(&mut self.dram);
    }

    /// The MMU, for inspecting frames and table state
    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    /// The DRAM store. Beware: dirty cache lines make direct reads stale
    /// until [`VirtualMemory::flush_cache`].
    pub fn dram(&self) -> &PhysicalMemory {
        &self.dram
    }

    /// Number of swap slots handed out so far
    pub fn swap_slots(&self) -> usize {
        self.swap.slot_count()
    }
}

impl Default for VirtualMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{NUM_PAGE_FRAMES, PAGE_SIZE};

    #[test]
    fn test_byte_write_read_round_trip() {
        let mut vm = VirtualMemory::new();
        vm.write_byte(0x1000, 0xcd).expect("write failed");
        assert_eq!(vm.read_byte(0x1000).expect("read failed"), 0xcd);
    }

    #[test]
    fn test_word_straddles_page_boundary() {
        let mut vm = VirtualMemory::new();
        let vaddr = PAGE_SIZE - 3;
        vm.write_u64(vaddr, 0x0123_4567_89ab_cdef).expect("write failed");
        assert_eq!(vm.read_u64(vaddr).expect("read failed"), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn test_untouched_page_reads_zero() {
        let mut vm = VirtualMemory::new();
        assert_eq!(vm.read_byte(0x4_2000).expect("read failed"), 0);
    }

    #[test]
    fn test_data_survives_thrashing_every_frame() {
        let mut vm = VirtualMemory::new();
        // one marked byte per page, across twice as many pages as frames
        let pages = 2 * NUM_PAGE_FRAMES as u64;
        for i in 0..pages {
            vm.write_byte(i * PAGE_SIZE + 7, i as u8).expect("write failed");
        }
        for i in 0..pages {
            assert_eq!(
                vm.read_byte(i * PAGE_SIZE + 7).expect("read failed"),
                i as u8,
                "page {} lost its byte",
                i
            );
        }
        // every page materialized once: one permanent slot each
        assert_eq!(vm.swap_slots(), pages as usize);
    }
}
