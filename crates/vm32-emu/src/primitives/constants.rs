//! Global constants for the emulator core.

/// Page size used by the MMU, the fetch window, and the stack window (4 KiB).
pub const PAGE_SIZE: u32 = 4096;
/// Number of low bits addressed within a page.
pub const PAGE_SHIFT: u32 = 12;
/// Mask selecting the in-page offset of a virtual or physical address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

/// Number of page-directory / page-table entries per page (4 KiB / 4 bytes).
pub const ENTRIES_PER_TABLE: u32 = 1024;

/// Virtual page number space: one slot per 4 KiB page across a 32-bit address space.
pub const TB_SZ: usize = 1 << 20;
/// Bound on the number of distinct pages a TLB generation may cache before a forced flush.
pub const TPAGES: usize = 4096;

/// Default physical memory size (128 MiB) when the driver does not override it.
pub const DEFAULT_MEMORY_MB: u32 = 128;
/// Size of the RAM-filesystem window reserved at the top of physical memory.
pub const FS_SZ: u32 = 4 * 1024 * 1024;

/// Number of dispatched instructions between device tick polls.
pub const TICK_INTERVAL: u64 = 4096;

/// Magic number at the start of an executable image.
pub const IMAGE_MAGIC: u32 = 0xC0DE_F00D;
/// Size in bytes of the executable image header (four little-endian u32 fields).
pub const IMAGE_HEADER_SIZE: usize = 16;

/// The `USER` bit (value 16), OR'd into a trap code when the fault occurred in user mode.
pub const USER_BIT: u32 = 16;

/// Page-table entry flag bits, valid for both page-directory and page-table entries.
pub mod pte {
    /// Present: the entry names a valid next-level table or page.
    pub const P: u32 = 1 << 0;
    /// Writeable.
    pub const W: u32 = 1 << 1;
    /// User-accessible.
    pub const U: u32 = 1 << 2;
    /// Accessed.
    pub const A: u32 = 1 << 3;
    /// Dirty.
    pub const D: u32 = 1 << 4;
}
