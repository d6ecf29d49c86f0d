//! Size-ordered free-block index with best-fit search
//!
//! Free blocks are keyed by `(blocksize, header)` in a `BTreeSet`, so the
//! best fit - the smallest block that still holds the request, ties broken
//! toward the lowest address - is a single range lookup.
//!
//! A block's size changes whenever it is split or coalesced, so the
//! allocator deletes it under its old key before the mutation and reinserts
//! it under the new one; keys are never mutated in place.

use super::super::block::{request_blocksize, Address, HeapBuf};
use super::FreeBlockIndex;
use std::collections::BTreeSet;

/// Best-fit index over `(blocksize, header)` pairs
#[derive(Debug, Clone, Default)]
pub struct SizeTree {
    entries: BTreeSet<(u32, Address)>,
}

impl SizeTree {
    pub fn new() -> Self {
        SizeTree {
            entries: BTreeSet::new(),
        }
    }

    /// Number of blocks currently indexed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FreeBlockIndex for SizeTree {
    fn initialize(&mut self, buf: &HeapBuf) {
        self.entries.clear();
        self.insert(buf, buf.first_block());
    }

    fn search(&self, _buf: &HeapBuf, payload_size: u32) -> Option<(Address, u32)> {
        let request = request_blocksize(payload_size);
        self.entries
            .range((request, 0)..)
            .next()
            .map(|&(_, header)| (header, request))
    }

    fn insert(&mut self, buf: &HeapBuf, header: Address) {
        let blocksize = buf.blocksize(header);
        let inserted = self.entries.insert((blocksize, header));
        debug_assert!(inserted, "block 0x{:x} inserted twice", header);
    }

    fn delete(&mut self, buf: &HeapBuf, header: Address) {
        let blocksize = buf.blocksize(header);
        if !self.entries.remove(&(blocksize, header)) {
            panic!(
                "deleting block 0x{:x} (size {}) that is not in the index",
                header, blocksize
            );
        }
    }
}
