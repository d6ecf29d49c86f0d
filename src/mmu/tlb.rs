//! Translation lookaside buffer
//!
//! A small set-associative cache of `(tag, ppn)` pairs indexed by the low
//! bits of the virtual page number. Unlike the SRAM cache the TLB evicts
//! uniformly at random within the set - translations are cheap to
//! regenerate, so the bookkeeping for LRU is not worth its cost here.
//!
//! The randomness comes from an xorshift generator seeded at construction,
//! so runs are reproducible.

use super::address::VirtAddr;
use crate::constants::{TLB_LINES_PER_SET, TLB_NUM_SETS};
use log::trace;

#[derive(Debug, Clone, Copy, Default)]
struct TlbLine {
    valid: bool,
    tag: u64,
    ppn: u64,
}

/// Result of a TLB probe: the translation if present, and a free way the
/// caller should prefer when installing
#[derive(Debug, Clone, Copy)]
pub struct TlbProbe {
    pub ppn: Option<u64>,
    pub free_way: Option<usize>,
}

/// Set-associative translation cache
#[derive(Debug, Clone)]
pub struct Tlb {
    sets: Vec<[TlbLine; TLB_LINES_PER_SET]>,
    rand_state: u64,
}

impl Tlb {
    pub fn new() -> Self {
        Tlb {
            sets: vec![[TlbLine::default(); TLB_LINES_PER_SET]; TLB_NUM_SETS],
            rand_state: 0x2545_f491_4f6c_dd1d,
        }
    }

    fn next_rand(&mut self) -> u64 {
        // xorshift64
        let mut x = self.rand_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rand_state = x;
        x
    }

    /// Probe for `vaddr`'s translation and report a free way in its set
    pub fn lookup(&self, vaddr: VirtAddr) -> TlbProbe {
        let set = &self.sets[vaddr.tlb_index()];
        let tag = vaddr.tlb_tag();

        let mut probe = TlbProbe {
            ppn: None,
            free_way: None,
        };
        for (way, line) in set.iter().enumerate() {
            if !line.valid {
                if probe.free_way.is_none() {
                    probe.free_way = Some(way);
                }
            } else if line.tag == tag {
                probe.ppn = Some(line.ppn);
            }
        }
        probe
    }

    /// Install a translation, preferring the probed free way and otherwise
    /// evicting a random way in the set
    pub fn install(&mut self, vaddr: VirtAddr, ppn: u64, free_way: Option<usize>) {
        let way = match free_way {
            Some(way) => way,
            None => (self.next_rand() % TLB_LINES_PER_SET as u64) as usize,
        };
        let index = vaddr.tlb_index();
        let line = &mut self.sets[index][way];
        if line.valid && line.tag != vaddr.tlb_tag() {
            trace!("tlb evict set {} way {} (tag 0x{:x})", index, way, line.tag);
        }
        *line = TlbLine {
            valid: true,
            tag: vaddr.tlb_tag(),
            ppn,
        };
    }

    /// Drop the translation for a virtual page if cached (flush-on-evict)
    pub fn invalidate(&mut self, virtual_page: u64) {
        let index = (virtual_page & (TLB_NUM_SETS as u64 - 1)) as usize;
        let tag = virtual_page >> crate::constants::TLB_INDEX_BITS;
        for line in self.sets[index].iter_mut() {
            if line.valid && line.tag == tag {
                line.valid = false;
                trace!("tlb invalidate page 0x{:x}", virtual_page);
            }
        }
    }

    /// Drop every cached translation
    pub fn flush(&mut self) {
        for set in self.sets.iter_mut() {
            for line in set.iter_mut() {
                line.valid = false;
            }
        }
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}
