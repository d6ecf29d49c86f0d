//! Simulated physical storage
//!
//! This module provides the two storage devices under the translation
//! pipeline:
//! - [`dram`]: flat byte-addressable physical memory with little-endian
//!   word primitives and cache-line block transfer
//! - [`swap`]: page-granular backing storage addressed by opaque disk
//!   addresses, the target of page-out and the source of page-in
//!
//! Both are plain owned structures with explicit construction; nothing in
//! this module knows about virtual addresses.

pub mod dram;
pub mod swap;
