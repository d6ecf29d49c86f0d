//! # Introduction
//!
//! memsim is the memory core of an x86-64 instruction-set simulator: a
//! demand-paged virtual memory hierarchy and an explicit heap allocator,
//! both operating over simulated byte-addressable storage.
//!
//! ## Translation pipeline
//!
//! ```text
//! virtual address → TLB → page walk → fault/swap handler
//!                                   → physical address → SRAM cache → DRAM
//! ```
//!
//! 1. [`mmu`] — the 4-level page-table walker, the page-fault/swap handler
//!    with free → clean-LRU → dirty-LRU victim selection, and the
//!    set-associative TLB.
//! 2. [`cache`] — the write-back/write-allocate SRAM data cache.
//! 3. [`memory`] — the flat DRAM store and the page-granular swap store.
//! 4. [`vm`] — [`vm::VirtualMemory`], the assembled pipeline exposing
//!    byte and word access at virtual addresses.
//!
//! ## Heap allocator
//!
//! [`allocator`] — boundary-tag blocks (header/footer size+flag words),
//! immediate coalescing on free, page-granular heap growth, and a
//! pluggable free-block index (implicit scan, explicit LIFO list, or
//! best-fit size tree).
//!
//! The instruction decode/execute cycle, registers, ELF loading and any
//! CLI around the simulator are external collaborators; they consume this
//! crate through [`vm::VirtualMemory`] and [`allocator::HeapAllocator`].

pub mod allocator;
pub mod cache;
pub mod constants;
pub mod errors;
pub mod memory;
pub mod mmu;
pub mod vm;
