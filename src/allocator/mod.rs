//! Boundary-tag heap allocator over a simulated flat memory region
//!
//! This module provides the allocator half of the memory core:
//! - [`block`]: the [`block::HeapBuf`] byte array and the header/footer
//!   block encoding (size + allocated bit packed into one u32)
//! - [`index`]: pluggable free-block search strategies (implicit scan,
//!   explicit LIFO list, size-ordered best-fit tree)
//! - [`heap`]: the [`heap::HeapAllocator`] itself - `mem_alloc`/`mem_free`
//!   with splitting, immediate coalescing and page-granular heap growth
//!
//! # Invariants
//!
//! Two properties hold in every reachable heap state and are enforced by
//! the optional check mode:
//! - header and footer of every block larger than 8 bytes agree on
//!   `(size, allocated)`
//! - no two adjacent blocks are both free

pub mod block;
pub mod heap;
pub mod index;

pub use block::{Address, NIL};
pub use heap::HeapAllocator;
pub use index::IndexPolicy;
