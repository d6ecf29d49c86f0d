//! Set-associative SRAM data cache
//!
//! Write-back, write-allocate cache between the CPU and the flat DRAM
//! store. Each set ages all of its lines on every access and remembers the
//! age-maximal line as the standing replacement candidate before checking
//! for a hit; a hit resets that line's age. A miss prefers an invalid line,
//! otherwise evicts the candidate, writing it back to its own line address
//! first when dirty.
//!
//! A dirty line is the only authoritative copy of its block - the DRAM
//! underneath is stale until write-back. [`SramCache::flush_page`] folds
//! dirty lines back into DRAM (and invalidates them) before anything reads
//! DRAM directly, e.g. the swap handler paging a frame out.

use crate::constants::{SRAM_BLOCK_SIZE, SRAM_INDEX_BITS, SRAM_LINES_PER_SET, SRAM_NUM_SETS,
                       SRAM_OFFSET_BITS};
use crate::memory::dram::PhysicalMemory;
use crate::mmu::address::PhysAddr;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Invalid,
    Clean,
    Dirty,
}

#[derive(Debug, Clone)]
struct CacheLine {
    state: LineState,
    tag: u64,
    time: u64,
    block: [u8; SRAM_BLOCK_SIZE],
}

impl Default for CacheLine {
    fn default() -> Self {
        CacheLine {
            state: LineState::Invalid,
            tag: 0,
            time: 0,
            block: [0; SRAM_BLOCK_SIZE],
        }
    }
}

impl CacheLine {
    /// The line-aligned physical address this line caches
    fn base_addr(&self, set_index: usize) -> u64 {
        ((self.tag << SRAM_INDEX_BITS) | set_index as u64) << SRAM_OFFSET_BITS
    }
}

/// The SRAM data cache
#[derive(Debug, Clone)]
pub struct SramCache {
    sets: Vec<Vec<CacheLine>>,
}

impl SramCache {
    pub fn new() -> Self {
        SramCache {
            sets: vec![vec![CacheLine::default(); SRAM_LINES_PER_SET]; SRAM_NUM_SETS],
        }
    }

    /// Read one byte through the cache
    pub fn read_byte(&mut self, paddr: u64, pm: &mut PhysicalMemory) -> u8 {
        let paddr = PhysAddr(paddr);
        let line = self.access_line(paddr, pm);
        line.block[paddr.cache_offset()]
    }

    /// Write one byte through the cache (write-allocate, mark dirty)
    pub fn write_byte(&mut self, paddr: u64, value: u8, pm: &mut PhysicalMemory) {
        let paddr = PhysAddr(paddr);
        let line = self.access_line(paddr, pm);
        line.block[paddr.cache_offset()] = value;
        line.state = LineState::Dirty;
    }

    /// Bring the line for `paddr` into the cache (or find it there), aging
    /// the set and evicting if necessary, and return it
    fn access_line(&mut self, paddr: PhysAddr, pm: &mut PhysicalMemory) -> &mut CacheLine {
        let set_index = paddr.cache_index();
        let tag = paddr.cache_tag();
        let set = &mut self.sets[set_index];

        // age every line; remember the LRU-maximal line as the standing
        // victim and any invalid line as the free candidate
        let mut victim = 0;
        let mut max_time = 0;
        let mut invalid = None;
        for (way, line) in set.iter_mut().enumerate() {
            line.time += 1;
            if line.time > max_time {
                max_time = line.time;
                victim = way;
            }
            if line.state == LineState::Invalid && invalid.is_none() {
                invalid = Some(way);
            }
        }

        // hit?
        if let Some(way) = set
            .iter()
            .position(|line| line.state != LineState::Invalid && line.tag == tag)
        {
            set[way].time = 0;
            return &mut set[way];
        }

        // miss: fill an invalid line if one exists, else evict the victim
        let way = invalid.unwrap_or(victim);
        if set[way].state == LineState::Dirty {
            let base = set[way].base_addr(set_index);
            pm.write_block(base, &set[way].block);
            trace!("sram write-back set {} way {} -> 0x{:x}", set_index, way, base);
        }
        pm.read_block(paddr.cache_line_base(), &mut set[way].block);
        set[way].state = LineState::Clean;
        set[way].tag = tag;
        set[way].time = 0;
        &mut set[way]
    }

    /// Write back and invalidate every line caching the physical frame
    /// `ppn`. Called before the frame is paged out or reloaded.
    pub fn flush_page(&mut self, ppn: u64, pm: &mut PhysicalMemory) {
        let page_base = ppn << crate::constants::PAGE_OFFSET_BITS;
        let page_end = page_base + crate::constants::PAGE_SIZE;
        for (set_index, set) in self.sets.iter_mut().enumerate() {
            for line in set.iter_mut() {
                if line.state == LineState::Invalid {
                    continue;
                }
                let base = line.base_addr(set_index);
                if base >= page_base && base < page_end {
                    if line.state == LineState::Dirty {
                        pm.write_block(base, &line.block);
                    }
                    line.state = LineState::Invalid;
                }
            }
        }
    }

    /// Write back every dirty line, leaving the cache clean but warm
    pub fn flush_all(&mut self, pm: &mut PhysicalMemory) {
        for (set_index, set) in self.sets.iter_mut().enumerate() {
            for line in set.iter_mut() {
                if line.state == LineState::Dirty {
                    pm.write_block(line.base_addr(set_index), &line.block);
                    line.state = LineState::Clean;
                }
            }
        }
    }
}

impl Default for SramCache {
    fn default() -> Self {
        Self::new()
    }
}
