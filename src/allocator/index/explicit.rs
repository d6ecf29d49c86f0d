//! Explicit free list with side-table links
//!
//! The classic explicit list threads next/prev pointers through the free
//! blocks' payload bytes. Here the links live in an `FxHashMap` keyed by
//! header address instead, so free memory stays untyped and a stale link
//! can never be misread as payload after reallocation.
//!
//! Policy: LIFO insertion at the head, first-fit search in list order.

use super::super::block::{request_blocksize, Address, HeapBuf};
use super::FreeBlockIndex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    prev: Option<Address>,
    next: Option<Address>,
}

/// LIFO doubly-linked free list
#[derive(Debug, Clone, Default)]
pub struct ExplicitList {
    links: FxHashMap<Address, Links>,
    head: Option<Address>,
}

impl ExplicitList {
    pub fn new() -> Self {
        ExplicitList {
            links: FxHashMap::default(),
            head: None,
        }
    }

    /// Number of blocks currently on the list
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl FreeBlockIndex for ExplicitList {
    fn initialize(&mut self, buf: &HeapBuf) {
        self.links.clear();
        self.head = None;
        self.insert(buf, buf.first_block());
    }

    fn search(&self, buf: &HeapBuf, payload_size: u32) -> Option<(Address, u32)> {
        let request = request_blocksize(payload_size);
        let mut cursor = self.head;
        while let Some(header) = cursor {
            debug_assert!(!buf.allocated(header), "allocated block on the free list");
            if buf.blocksize(header) >= request {
                return Some((header, request));
            }
            cursor = self.links[&header].next;
        }
        None
    }

    fn insert(&mut self, _buf: &HeapBuf, header: Address) {
        debug_assert!(
            !self.links.contains_key(&header),
            "block 0x{:x} inserted twice",
            header
        );
        let links = Links {
            prev: None,
            next: self.head,
        };
        if let Some(old_head) = self.head {
            if let Some(old_links) = self.links.get_mut(&old_head) {
                old_links.prev = Some(header);
            }
        }
        self.links.insert(header, links);
        self.head = Some(header);
    }

    fn delete(&mut self, _buf: &HeapBuf, header: Address) {
        let links = match self.links.remove(&header) {
            Some(links) => links,
            None => panic!("deleting block 0x{:x} that is not on the free list", header),
        };
        match links.prev {
            Some(prev) => {
                if let Some(prev_links) = self.links.get_mut(&prev) {
                    prev_links.next = links.next;
                }
            }
            None => self.head = links.next,
        }
        if let Some(next) = links.next {
            if let Some(next_links) = self.links.get_mut(&next) {
                next_links.prev = links.prev;
            }
        }
    }
}
