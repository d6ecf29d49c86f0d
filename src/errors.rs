//! Error types for the memory core
//!
//! This module defines [`MemoryError`], which covers every recoverable
//! failure the simulator can report: allocator usage errors, resource
//! exhaustion, heap-consistency findings and backing-store failures.
//!
//! Invariant violations that indicate a simulator bug (a page frame claimed
//! by two page-table entries, a malformed page-table shape) are *not*
//! represented here - those panic loudly instead of returning.

use std::fmt;

/// Recoverable errors reported by the allocator and the translation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Allocation request of zero bytes or at/above the heap ceiling
    InvalidRequest { size: u32 },

    /// The heap cannot grow far enough to satisfy the request
    OutOfMemory { requested: u32, limit: u64 },

    /// Freeing a block that is already free
    DoubleFree { address: u64 },

    /// Freeing an address that is not the payload of an allocated block
    InvalidFree { address: u64 },

    /// The heap-walk validator found an inconsistent block
    CorruptHeap { address: u64, reason: String },

    /// Page-in from a disk address the backing store does not know
    SwapReadFailed { disk_address: u64 },

    /// Page-out to a disk address the backing store does not know
    SwapWriteFailed { disk_address: u64 },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::InvalidRequest { size } => {
                write!(f, "Invalid allocation request of {} bytes", size)
            }
            MemoryError::OutOfMemory { requested, limit } => {
                write!(
                    f,
                    "Out of memory: {} bytes requested, heap ceiling is {}",
                    requested, limit
                )
            }
            MemoryError::DoubleFree { address } => {
                write!(f, "Double free at address 0x{:x}", address)
            }
            MemoryError::InvalidFree { address } => {
                write!(
                    f,
                    "Invalid free: address 0x{:x} is not an allocated payload",
                    address
                )
            }
            MemoryError::CorruptHeap { address, reason } => {
                write!(f, "Corrupt heap at address 0x{:x}: {}", address, reason)
            }
            MemoryError::SwapReadFailed { disk_address } => {
                write!(f, "Swap-in failed: unknown disk address {}", disk_address)
            }
            MemoryError::SwapWriteFailed { disk_address } => {
                write!(f, "Swap-out failed: unknown disk address {}", disk_address)
            }
        }
    }
}

impl std::error::Error for MemoryError {}
