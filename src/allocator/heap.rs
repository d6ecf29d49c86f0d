//! The boundary-tag heap allocator
//!
//! [`HeapAllocator`] implements `malloc`/`free` semantics over a [`HeapBuf`]:
//! first/best-fit search through a pluggable [`FreeBlockIndex`], block
//! splitting with an 8-byte minimum remainder, immediate coalescing on free,
//! and page-granular heap growth against a configurable ceiling.
//!
//! # Errors
//!
//! Usage errors (double free, freeing a non-payload address, out-of-range
//! requests) and exhaustion are reported as typed [`MemoryError`] values.
//! The optional check mode ([`HeapAllocator::set_check_mode`]) re-validates
//! the whole heap after every mutation; it is O(n) per call and off by
//! default.

use super::block::{
    request_blocksize, round_up, Address, HeapBuf, MIN_BLOCK_SIZE, NIL, SENTINEL_OVERHEAD,
    TAG_SIZE,
};
use super::index::{make_index, FreeBlockIndex, IndexPolicy};
use crate::constants::PAGE_SIZE;
use crate::errors::MemoryError;
use log::debug;
use std::fmt::Write as _;

/// Boundary-tag allocator over a simulated flat heap
pub struct HeapAllocator {
    buf: HeapBuf,
    index: Box<dyn FreeBlockIndex>,
    policy: IndexPolicy,
    check_mode: bool,
}

impl HeapAllocator {
    /// Create an allocator with the given heap ceiling and index policy.
    /// The heap comes up initialized (one free block spanning the first
    /// page).
    pub fn new(max_heap_size: u64, policy: IndexPolicy) -> Self {
        let mut alloc = HeapAllocator {
            buf: HeapBuf::new(max_heap_size),
            index: make_index(policy),
            policy,
            check_mode: false,
        };
        alloc.heap_init();
        alloc
    }

    /// The index policy this allocator was built with
    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    /// Enable or disable the O(n) heap validator after every mutation
    pub fn set_check_mode(&mut self, enabled: bool) {
        self.check_mode = enabled;
    }

    /// Current heap extent in bytes
    pub fn extent(&self) -> u64 {
        self.buf.extent()
    }

    /// Read-only view of the underlying heap buffer
    pub fn buf(&self) -> &HeapBuf {
        &self.buf
    }

    /// Reset the heap to its initial state: zeroed array, prologue and
    /// epilogue sentinels, one free block filling the rest of the first
    /// page, and a freshly initialized index.
    pub fn heap_init(&mut self) {
        self.buf.reset();

        let prologue = self.buf.prologue();
        self.buf.set_blocksize(prologue, 8);
        self.buf.set_allocated(prologue, true);
        self.buf.set_blocksize(prologue + TAG_SIZE, 8);
        self.buf.set_allocated(prologue + TAG_SIZE, true);

        let epilogue = self.buf.epilogue();
        self.buf.set_blocksize(epilogue, 0);
        self.buf.set_allocated(epilogue, true);

        let first = self.buf.first_block();
        let first_size = (PAGE_SIZE - SENTINEL_OVERHEAD) as u32;
        self.buf.set_blocksize(first, first_size);
        self.buf.set_allocated(first, false);
        let first_footer = self.buf.footer_addr(first);
        self.buf.set_blocksize(first_footer, first_size);
        self.buf.set_allocated(first_footer, false);

        self.index.initialize(&self.buf);
    }

    /// Allocate `size` payload bytes; returns the 8-byte-aligned payload
    /// address
    pub fn mem_alloc(&mut self, size: u32) -> Result<Address, MemoryError> {
        if size == 0 || size as u64 >= self.buf.max_size() - SENTINEL_OVERHEAD {
            return Err(MemoryError::InvalidRequest { size });
        }

        let payload = match self.index.search(&self.buf, size) {
            Some((header, carve)) => match self.try_alloc_with_splitting(header, carve) {
                Some(payload) => payload,
                None => panic!(
                    "index returned block 0x{:x} that does not fit {} bytes",
                    header, carve
                ),
            },
            None => self.try_extend_heap_to_alloc(request_blocksize(size))?,
        };

        debug!("mem_alloc({}) -> 0x{:x}", size, payload);
        if self.check_mode {
            self.check_heap()?;
        }
        Ok(payload)
    }

    /// Free the block whose payload starts at `payload`. `NIL` is a no-op.
    pub fn mem_free(&mut self, payload: Address) -> Result<(), MemoryError> {
        if payload == NIL {
            return Ok(());
        }
        if payload & 0x7 != 0
            || payload <= self.buf.first_block()
            || payload >= self.buf.epilogue()
        {
            return Err(MemoryError::InvalidFree { address: payload });
        }
        if self.check_mode && !self.is_block_payload(payload) {
            return Err(MemoryError::InvalidFree { address: payload });
        }

        let req = self.buf.header_addr(payload);
        if !self.buf.allocated(req) {
            return Err(MemoryError::DoubleFree { address: payload });
        }
        let req_footer = self.buf.footer_addr(req);

        // sentinel neighbors read as allocated: None means the prologue or
        // epilogue side, which never coalesces
        let prev = self.buf.prev_header(req).filter(|&h| !self.buf.allocated(h));
        let next = self.buf.next_header(req).filter(|&h| !self.buf.allocated(h));

        match (prev, next) {
            (None, None) => {
                // *A(A->F)A*
                self.buf.set_allocated(req, false);
                self.buf.set_allocated(req_footer, false);
                self.index.insert(&self.buf, req);
            }
            (None, Some(next)) => {
                // *A(A->F)FA -> merge with next
                self.index.delete(&self.buf, next);
                let merged = self.merge_blocks_as_free(req, next);
                self.index.insert(&self.buf, merged);
            }
            (Some(prev), None) => {
                // AF(A->F)A* -> merge with prev
                self.index.delete(&self.buf, prev);
                let merged = self.merge_blocks_as_free(prev, req);
                self.index.insert(&self.buf, merged);
            }
            (Some(prev), Some(next)) => {
                // AF(A->F)FA -> merge with both
                self.index.delete(&self.buf, prev);
                self.index.delete(&self.buf, next);
                let merged = self.merge_blocks_as_free(prev, req);
                let merged = self.merge_blocks_as_free(merged, next);
                self.index.insert(&self.buf, merged);
            }
        }

        debug!("mem_free(0x{:x})", payload);
        if self.check_mode {
            self.check_heap()?;
        }
        Ok(())
    }

    /// Merge two adjacent blocks into one free block and return its header.
    /// Header and footer of the result are rewritten together.
    fn merge_blocks_as_free(&mut self, low: Address, high: Address) -> Address {
        debug_assert!(low % 8 == 4 && high % 8 == 4);
        debug_assert_eq!(self.buf.next_header(low), Some(high));

        let blocksize = self.buf.blocksize(low) + self.buf.blocksize(high);
        self.buf.set_blocksize(low, blocksize);
        self.buf.set_allocated(low, false);
        let footer = self.buf.footer_addr(low);
        self.buf.set_blocksize(footer, blocksize);
        self.buf.set_allocated(footer, false);
        low
    }

    /// Carve `request` bytes out of the free block at `header`. The
    /// remainder becomes a new free block when it can hold at least a
    /// header and footer; otherwise the whole block is consumed.
    fn try_alloc_with_splitting(&mut self, header: Address, request: u32) -> Option<Address> {
        if request < MIN_BLOCK_SIZE {
            return None;
        }
        let blocksize = self.buf.blocksize(header);
        if self.buf.allocated(header) || blocksize < request {
            return None;
        }

        self.index.delete(&self.buf, header);
        let old_footer = self.buf.footer_addr(header);

        self.buf.set_allocated(header, true);
        self.buf.set_blocksize(header, request);
        let new_footer = header + request as u64 - TAG_SIZE;
        self.buf.set_allocated(new_footer, true);
        self.buf.set_blocksize(new_footer, request);

        let rest = blocksize - request;
        debug_assert!(rest % 8 == 0);
        if rest >= MIN_BLOCK_SIZE {
            let rest_header = header + request as u64;
            self.buf.set_allocated(rest_header, false);
            self.buf.set_blocksize(rest_header, rest);
            self.buf.set_allocated(old_footer, false);
            self.buf.set_blocksize(old_footer, rest);
            debug_assert_eq!(self.buf.footer_addr(rest_header), old_footer);
            self.index.insert(&self.buf, rest_header);
            debug!(
                "split block 0x{:x}: carved {}, remainder {} at 0x{:x}",
                header, request, rest, rest_header
            );
        }
        Some(self.buf.payload_addr(header))
    }

    /// Grow the heap to satisfy `request` bytes, merging with a trailing
    /// free block first so the extension requests only the deficit
    fn try_extend_heap_to_alloc(&mut self, request: u32) -> Result<Address, MemoryError> {
        let old_last = self.buf.last_block();
        let last_allocated = self.buf.allocated(old_last);
        let last_blocksize = self.buf.blocksize(old_last);

        let mut deficit = request;
        if !last_allocated {
            // the trailing free block contributes to the request
            deficit -= last_blocksize.min(deficit);
            self.index.delete(&self.buf, old_last);
        }
        debug_assert!(deficit > 0, "search missed a fitting trailing free block");

        let old_epilogue = self.buf.epilogue();
        let granted = self.extend_heap(deficit);
        if granted == 0 {
            if !last_allocated {
                self.index.insert(&self.buf, old_last);
            }
            debug!(
                "heap extension refused: {} over ceiling {}",
                request,
                self.buf.max_size()
            );
            return Err(MemoryError::OutOfMemory {
                requested: request,
                limit: self.buf.max_size(),
            });
        }
        debug_assert!(granted >= PAGE_SIZE as u32 && granted % PAGE_SIZE as u32 == 0);

        let free_header = if last_allocated {
            // the old epilogue becomes the header of the new free block
            self.buf.set_allocated(old_epilogue, false);
            self.buf.set_blocksize(old_epilogue, granted);
            let footer = self.buf.footer_addr(old_epilogue);
            self.buf.set_allocated(footer, false);
            self.buf.set_blocksize(footer, granted);
            old_epilogue
        } else {
            // absorb the grant into the trailing free block
            let merged_size = last_blocksize + granted;
            self.buf.set_allocated(old_last, false);
            self.buf.set_blocksize(old_last, merged_size);
            let footer = self.buf.footer_addr(old_last);
            self.buf.set_allocated(footer, false);
            self.buf.set_blocksize(footer, merged_size);
            old_last
        };
        self.index.insert(&self.buf, free_header);
        debug!(
            "extended heap by {} bytes, free block 0x{:x} spans {}",
            granted,
            free_header,
            self.buf.blocksize(free_header)
        );

        match self.try_alloc_with_splitting(free_header, request) {
            Some(payload) => Ok(payload),
            None => panic!("extended heap does not fit the {}-byte request", request),
        }
    }

    /// Ask the environment for more heap. Rounds up to page granularity and
    /// enforces the ceiling; returns the bytes granted, 0 on refusal. The
    /// epilogue is re-planted at the new heap end.
    fn extend_heap(&mut self, size: u32) -> u32 {
        let size = round_up(size as u64, PAGE_SIZE);
        if self.buf.extent() + size > self.buf.max_size() {
            return 0;
        }
        self.buf.extend(size);

        let epilogue = self.buf.epilogue();
        self.buf.set_allocated(epilogue, true);
        self.buf.set_blocksize(epilogue, 0);
        size as u32
    }

    /// Whether `payload` is the payload address of some current block
    fn is_block_payload(&self, payload: Address) -> bool {
        let mut cursor = Some(self.buf.first_block());
        while let Some(header) = cursor {
            if self.buf.payload_addr(header) == payload {
                return true;
            }
            cursor = self.buf.next_header(header);
        }
        false
    }

    /// Walk the whole heap and verify its invariants: header alignment,
    /// header/footer agreement, no two adjacent free blocks, and
    /// conservation (blocks tile the heap exactly).
    pub fn check_heap(&self) -> Result<(), MemoryError> {
        let corrupt = |address, reason: &str| {
            Err(MemoryError::CorruptHeap {
                address,
                reason: reason.to_string(),
            })
        };

        let mut free_run = 0;
        let mut header = self.buf.first_block();
        loop {
            if header % 8 != 4 {
                return corrupt(header, "header not at an 8n+4 address");
            }
            let blocksize = self.buf.blocksize(header);
            if blocksize < MIN_BLOCK_SIZE {
                return corrupt(header, "block smaller than the minimum");
            }
            if blocksize > MIN_BLOCK_SIZE {
                let footer = self.buf.footer_addr(header);
                if self.buf.blocksize(footer) != blocksize
                    || self.buf.allocated(footer) != self.buf.allocated(header)
                {
                    return corrupt(header, "header and footer disagree");
                }
            }

            if self.buf.allocated(header) {
                free_run = 0;
            } else {
                free_run += 1;
                if free_run > 1 {
                    return corrupt(header, "two adjacent free blocks");
                }
            }

            match self.buf.next_header(header) {
                Some(next) => header = next,
                None => break,
            }
        }

        // conservation: the last block must end exactly at the epilogue
        let end = header + self.buf.blocksize(header) as u64;
        if end != self.buf.epilogue() {
            return corrupt(header, "blocks do not tile the heap");
        }
        Ok(())
    }

    /// Render every block as `[H:header, F:footer, S:size, A:allocated]`,
    /// one per line, for logs and test diagnostics
    pub fn dump_blocks(&self) -> String {
        let mut out = String::new();
        let mut cursor = Some(self.buf.first_block());
        while let Some(header) = cursor {
            let _ = writeln!(
                out,
                "[H:{}, F:{}, S:{}, A:{}]",
                header,
                self.buf.footer_addr(header),
                self.buf.blocksize(header),
                self.buf.allocated(header) as u8
            );
            cursor = self.buf.next_header(header);
        }
        out
    }
}
