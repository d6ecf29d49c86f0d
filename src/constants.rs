// Geometry constants for the simulated memory hierarchy

/// Size of one virtual or physical page in bytes
pub const PAGE_SIZE: u64 = 4096;

/// Width of the page offset in bits (log2 of [`PAGE_SIZE`])
pub const PAGE_OFFSET_BITS: u32 = 12;

/// Number of radix levels in the page table (x86-64 style 4-level walk)
pub const PAGE_TABLE_LEVELS: usize = 4;

/// Bits of virtual page number consumed per level
pub const VPN_BITS_PER_LEVEL: u32 = 9;

/// Entries per page table (one level's fanout)
pub const PAGE_TABLE_ENTRIES: usize = 1 << VPN_BITS_PER_LEVEL;

/// Size of the simulated DRAM in bytes.
/// Kept deliberately small (16 frames) so that demand paging and eviction
/// are exercised by ordinary workloads.
pub const PHYSICAL_MEMORY_SIZE: u64 = 65536;

/// Number of physical page frames in DRAM
pub const NUM_PAGE_FRAMES: usize = (PHYSICAL_MEMORY_SIZE / PAGE_SIZE) as usize;

/// Default ceiling for the simulated heap (8 pages)
pub const HEAP_MAX_SIZE: u64 = PAGE_SIZE * 8;

/// Width of the SRAM cache block offset in bits (64-byte lines)
pub const SRAM_OFFSET_BITS: u32 = 6;

/// Width of the SRAM cache set index in bits (16 sets)
pub const SRAM_INDEX_BITS: u32 = 4;

/// Associativity of the SRAM cache
pub const SRAM_LINES_PER_SET: usize = 8;

/// Bytes per SRAM cache line
pub const SRAM_BLOCK_SIZE: usize = 1 << SRAM_OFFSET_BITS;

/// Number of SRAM cache sets
pub const SRAM_NUM_SETS: usize = 1 << SRAM_INDEX_BITS;

/// Width of the TLB set index in bits (8 sets)
pub const TLB_INDEX_BITS: u32 = 3;

/// Number of TLB sets
pub const TLB_NUM_SETS: usize = 1 << TLB_INDEX_BITS;

/// Associativity of the TLB
pub const TLB_LINES_PER_SET: usize = 4;
