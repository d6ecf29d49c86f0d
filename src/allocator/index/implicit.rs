//! Implicit free list: first-fit scan over the block structure itself

use super::super::block::{request_blocksize, Address, HeapBuf};
use super::FreeBlockIndex;

/// The no-state strategy: every search walks the heap from the first block
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitScan;

impl FreeBlockIndex for ImplicitScan {
    fn initialize(&mut self, _buf: &HeapBuf) {}

    fn search(&self, buf: &HeapBuf, payload_size: u32) -> Option<(Address, u32)> {
        let request = request_blocksize(payload_size);
        let mut cursor = Some(buf.first_block());
        while let Some(header) = cursor {
            if !buf.allocated(header) && buf.blocksize(header) >= request {
                return Some((header, request));
            }
            cursor = buf.next_header(header);
        }
        None
    }

    fn insert(&mut self, _buf: &HeapBuf, _header: Address) {}

    fn delete(&mut self, _buf: &HeapBuf, _header: Address) {}
}
