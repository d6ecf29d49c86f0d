//! Boundary-tag block encoding over the simulated heap
//!
//! [`HeapBuf`] owns the flat heap byte array and knows how blocks are laid
//! out in it. Every block starts with a 4-byte header word and (except the
//! header-only epilogue) ends with a 4-byte footer word; both pack the block
//! size and the allocated bit into one little-endian u32:
//!
//! ```text
//! bits 3..32: block size (multiple of 8, includes header+footer+payload)
//! bit  0:     allocated flag
//! ```
//!
//! Heap byte layout after `reset()`:
//!
//! ```text
//! [0..4)            unused, keeps the first payload 8-byte aligned
//! [4..12)           prologue block (allocated sentinel, header + footer)
//! [12..end-4)       regular blocks
//! [end-4..end)      epilogue block (allocated sentinel, header only, size 0)
//! ```
//!
//! Headers therefore always sit at addresses of the form `8n + 4` and
//! payloads at `8n`. All accessors take block-relative virtual addresses and
//! assert the alignment and range invariants; a violated assertion means a
//! simulator bug, not a user error.

/// Virtual address within the simulated heap
pub type Address = u64;

/// The null address: allocation failure sentinel and no-op free target
pub const NIL: Address = 0;

/// Header or footer size in bytes
pub const TAG_SIZE: u64 = 4;

/// Smallest legal block: header + footer, zero payload
pub const MIN_BLOCK_SIZE: u32 = 8;

/// Bytes consumed by the sentinels and the alignment pad
/// (4 unused + 8 prologue + 4 epilogue)
pub const SENTINEL_OVERHEAD: u64 = 16;

/// Round `x` up to the next multiple of `n`
pub fn round_up(x: u64, n: u64) -> u64 {
    n * ((x + n - 1) / n)
}

/// Block size carved for a payload request: payload rounded up to 8 bytes
/// plus header and footer
pub fn request_blocksize(payload_size: u32) -> u32 {
    round_up(payload_size as u64, 8) as u32 + 2 * TAG_SIZE as u32
}

/// The flat heap array plus its block-structure view
#[derive(Debug, Clone)]
pub struct HeapBuf {
    bytes: Vec<u8>,
    start: Address,
    end: Address,
    max_size: u64,
}

impl HeapBuf {
    /// Create an uninitialized heap with the given ceiling.
    /// Call [`HeapBuf::reset`] before use.
    pub fn new(max_size: u64) -> Self {
        assert!(
            max_size % crate::constants::PAGE_SIZE == 0,
            "heap ceiling must be page aligned"
        );
        HeapBuf {
            bytes: vec![0; max_size as usize],
            start: 0,
            end: 0,
            max_size,
        }
    }

    /// Zero the array and shrink the heap back to its initial single page.
    /// Sentinels are planted by the allocator, not here.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.start = 0;
        self.end = crate::constants::PAGE_SIZE;
    }

    /// Current heap extent in bytes (`end - start`)
    pub fn extent(&self) -> u64 {
        self.end - self.start
    }

    /// The configured heap ceiling
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Grow the heap by `granted` bytes (already page rounded by the caller)
    pub fn extend(&mut self, granted: u64) {
        debug_assert!(granted % crate::constants::PAGE_SIZE == 0);
        debug_assert!(self.extent() + granted <= self.max_size);
        self.end += granted;
    }

    fn read_u32(&self, addr: Address) -> u32 {
        let i = addr as usize;
        u32::from_le_bytes([
            self.bytes[i],
            self.bytes[i + 1],
            self.bytes[i + 2],
            self.bytes[i + 3],
        ])
    }

    fn write_u32(&mut self, addr: Address, value: u32) {
        let i = addr as usize;
        self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn assert_tag_addr(&self, addr: Address) {
        assert!(
            self.prologue() <= addr && addr <= self.epilogue(),
            "tag address 0x{:x} outside heap [0x{:x}, 0x{:x}]",
            addr,
            self.prologue(),
            self.epilogue()
        );
        assert!(addr & 0x3 == 0, "tag address 0x{:x} not 4-byte aligned", addr);
    }

    /// Block size stored in the header or footer word at `addr`
    pub fn blocksize(&self, addr: Address) -> u32 {
        self.assert_tag_addr(addr);
        self.read_u32(addr) & 0xffff_fff8
    }

    /// Store a block size into the header or footer word at `addr`,
    /// preserving the flag bits
    pub fn set_blocksize(&mut self, addr: Address, blocksize: u32) {
        self.assert_tag_addr(addr);
        assert!(blocksize & 0x7 == 0, "block size {} not 8-byte aligned", blocksize);
        let flags = self.read_u32(addr) & 0x0000_0007;
        self.write_u32(addr, blocksize | flags);
    }

    /// Allocated flag stored in the header or footer word at `addr`
    pub fn allocated(&self, addr: Address) -> bool {
        self.assert_tag_addr(addr);
        self.read_u32(addr) & 0x1 == 0x1
    }

    /// Store the allocated flag into the header or footer word at `addr`,
    /// preserving the size bits
    pub fn set_allocated(&mut self, addr: Address, allocated: bool) {
        self.assert_tag_addr(addr);
        let word = self.read_u32(addr) & 0xffff_fff8;
        self.write_u32(addr, word | allocated as u32);
    }

    /// Header address of the prologue sentinel
    pub fn prologue(&self) -> Address {
        self.start + TAG_SIZE
    }

    /// Header address of the epilogue sentinel (header only, size 0)
    pub fn epilogue(&self) -> Address {
        self.end - TAG_SIZE
    }

    /// Header address of the first regular block
    pub fn first_block(&self) -> Address {
        // 4 unused bytes + 8-byte prologue
        self.prologue() + 8
    }

    /// Header address of the last regular block, located through the footer
    /// that sits immediately before the epilogue
    pub fn last_block(&self) -> Address {
        let last_footer = self.epilogue() - TAG_SIZE;
        let last_blocksize = self.blocksize(last_footer);
        let last_header = self.epilogue() - last_blocksize as u64;
        debug_assert!(self.first_block() <= last_header);
        last_header
    }

    /// Payload address for a block, given its header or payload address
    pub fn payload_addr(&self, addr: Address) -> Address {
        debug_assert!(addr & 0x3 == 0);
        round_up(addr, 8)
    }

    /// Header address for a block, given its header or payload address
    pub fn header_addr(&self, addr: Address) -> Address {
        self.payload_addr(addr) - TAG_SIZE
    }

    /// Footer address for the block whose header is at `header`
    pub fn footer_addr(&self, header: Address) -> Address {
        let footer = header + self.blocksize(header) as u64 - TAG_SIZE;
        debug_assert!(self.first_block() < footer && footer < self.epilogue());
        footer
    }

    /// Whether `header` is the first regular block
    pub fn is_first_block(&self, header: Address) -> bool {
        self.header_addr(header) == self.first_block()
    }

    /// Whether `header` is the last regular block (its end touches the
    /// epilogue)
    pub fn is_last_block(&self, header: Address) -> bool {
        let header = self.header_addr(header);
        header + self.blocksize(header) as u64 == self.epilogue()
    }

    /// Header of the next block, or `None` past the last regular block
    pub fn next_header(&self, addr: Address) -> Option<Address> {
        let header = self.header_addr(addr);
        if self.is_last_block(header) {
            return None;
        }
        let next = header + self.blocksize(header) as u64;
        debug_assert!(self.first_block() < next && next <= self.last_block());
        Some(next)
    }

    /// Header of the previous block, or `None` before the first regular
    /// block
    pub fn prev_header(&self, addr: Address) -> Option<Address> {
        let header = self.header_addr(addr);
        if self.is_first_block(header) {
            return None;
        }
        let prev_footer = header - TAG_SIZE;
        let prev = header - self.blocksize(prev_footer) as u64;
        debug_assert!(self.first_block() <= prev && prev <= self.last_block());
        Some(prev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;

    fn fresh_buf() -> HeapBuf {
        let mut buf = HeapBuf::new(PAGE_SIZE * 8);
        buf.reset();
        // plant the sentinels the way the allocator does, so the accessors'
        // range assertions hold
        let prologue = buf.prologue();
        buf.set_blocksize(prologue, 8);
        buf.set_allocated(prologue, true);
        buf.set_blocksize(prologue + TAG_SIZE, 8);
        buf.set_allocated(prologue + TAG_SIZE, true);
        let epilogue = buf.epilogue();
        buf.set_blocksize(epilogue, 0);
        buf.set_allocated(epilogue, true);
        buf
    }

    #[test]
    fn test_round_up() {
        for i in 0..100u64 {
            for j in 1..=8u64 {
                assert_eq!(round_up(i * 8 + j, 8), (i + 1) * 8);
            }
            assert_eq!(round_up(i * 8, 8), i * 8);
        }
    }

    #[test]
    fn test_request_blocksize_adds_tag_overhead() {
        assert_eq!(request_blocksize(1), 16);
        assert_eq!(request_blocksize(8), 16);
        assert_eq!(request_blocksize(9), 24);
        assert_eq!(request_blocksize(100), 112);
    }

    #[test]
    fn test_size_and_flag_packing() {
        let mut buf = fresh_buf();
        let addr = buf.first_block();

        buf.set_blocksize(addr, 0x1234_abc0);
        buf.set_allocated(addr, false);
        assert_eq!(buf.blocksize(addr), 0x1234_abc0);
        assert!(!buf.allocated(addr));

        buf.set_allocated(addr, true);
        assert_eq!(buf.blocksize(addr), 0x1234_abc0);
        assert!(buf.allocated(addr));

        buf.set_blocksize(addr, 0x1234_abc8);
        assert_eq!(buf.blocksize(addr), 0x1234_abc8);
        assert!(buf.allocated(addr));
    }

    #[test]
    fn test_header_and_payload_addresses() {
        let buf = fresh_buf();
        let mut payload = buf.payload_addr(buf.first_block());
        while payload < buf.epilogue() {
            let header = payload - TAG_SIZE;
            assert_eq!(buf.payload_addr(header), payload);
            assert_eq!(buf.payload_addr(payload), payload);
            assert_eq!(buf.header_addr(header), header);
            assert_eq!(buf.header_addr(payload), header);
            payload += 8;
        }
    }

    #[test]
    fn test_forward_and_backward_traversal() {
        let mut buf = fresh_buf();

        // carve a deterministic run of blocks with varied sizes
        let sizes = [24u32, 8, 64, 16, 48, 8, 32];
        let mut headers = Vec::new();
        let mut h = buf.first_block();
        for (i, &size) in sizes.iter().enumerate() {
            buf.set_blocksize(h, size);
            buf.set_allocated(h, i % 2 == 0);
            let f = h + size as u64 - TAG_SIZE;
            buf.set_blocksize(f, size);
            buf.set_allocated(f, i % 2 == 0);
            headers.push(h);
            h += size as u64;
        }
        // the remainder fills out the page
        let rest = buf.epilogue() - h;
        buf.set_blocksize(h, rest as u32);
        buf.set_allocated(h, true);
        let f = h + rest - TAG_SIZE;
        buf.set_blocksize(f, rest as u32);
        buf.set_allocated(f, true);
        headers.push(h);

        // forward
        let mut cursor = Some(buf.first_block());
        for (i, &expect) in headers.iter().enumerate() {
            let h = cursor.expect("traversal ended early");
            assert_eq!(h, expect, "forward mismatch at block {}", i);
            cursor = buf.next_header(h);
        }
        assert_eq!(cursor, None);

        // backward
        let mut cursor = Some(buf.last_block());
        for (i, &expect) in headers.iter().enumerate().rev() {
            let h = cursor.expect("traversal ended early");
            assert_eq!(h, expect, "backward mismatch at block {}", i);
            cursor = buf.prev_header(h);
        }
        assert_eq!(cursor, None);
    }
}
