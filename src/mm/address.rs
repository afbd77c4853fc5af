//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for 32-bit memory addresses that prevent mixing
//! physical and virtual addresses at compile time.
//!
//! # Properties
//! - Physical addresses cannot be dereferenced directly
//! - Virtual addresses expose the two-level paging indices
//! - Page alignment helpers operate on the wrapped value only

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: u32 = 12;

/// Bits to shift for the directory index.
pub const DIRECTORY_SHIFT: u32 = 22;

/// Number of entries per directory or table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual address space covered by one page table (4 MiB).
pub const TABLE_SPAN: usize = PAGE_SIZE * ENTRIES_PER_TABLE;

/// Mask applied to a shifted address to obtain a table or directory index.
const INDEX_MASK: u32 = 0x3ff;

/// Round `size` up to the next multiple of [`PAGE_SIZE`].
#[inline]
pub const fn page_align_up(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Number of pages needed to hold `size` bytes.
#[inline]
pub const fn pages_for(size: usize) -> usize {
    page_align_up(size) / PAGE_SIZE
}

/// A physical memory address.
///
/// Physical addresses cannot be dereferenced; they reach memory only through
/// a [`PhysMapper`](super::phys::PhysMapper).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    /// Create a new physical address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the raw address as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page frame number.
    #[inline]
    pub const fn page_frame_number(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// Add a byte offset to this address.
    #[inline]
    pub const fn add(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset as u32))
    }

    /// Reinterpret this address as an identity-mapped virtual address.
    #[inline]
    pub const fn identity(self) -> VirtAddr {
        VirtAddr(self.0)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the raw address as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Index into the page directory (bits 31..22).
    #[inline]
    pub const fn directory_index(self) -> usize {
        ((self.0 >> DIRECTORY_SHIFT) & INDEX_MASK) as usize
    }

    /// Index into the page table (bits 21..12).
    #[inline]
    pub const fn table_index(self) -> usize {
        ((self.0 >> PAGE_SHIFT) & INDEX_MASK) as usize
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        (self.0 & PAGE_MASK) as usize
    }

    /// Add a byte offset to this address.
    #[inline]
    pub const fn add(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset as u32))
    }

    /// Subtract a byte offset from this address.
    #[inline]
    pub const fn sub(self, offset: usize) -> Self {
        Self(self.0.wrapping_sub(offset as u32))
    }

    /// Distance in bytes from `earlier` up to this address.
    ///
    /// Saturates to zero when `earlier` lies above `self`.
    #[inline]
    pub const fn distance_from(self, earlier: Self) -> usize {
        self.0.saturating_sub(earlier.0) as usize
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_indices() {
        let heap = VirtAddr::new(0xE000_0000);
        assert_eq!(heap.directory_index(), 0x380);
        assert_eq!(heap.table_index(), 0);

        let stack = VirtAddr::new(0xEFFF_FFF0);
        assert_eq!(stack.directory_index(), 0x3BF);
        assert_eq!(stack.table_index(), 0x3FF);
        assert_eq!(stack.page_offset(), 0xFF0);
    }

    #[test]
    fn test_page_alignment() {
        let addr = PhysAddr::new(0x0040_1234);
        assert!(!addr.is_aligned());
        assert_eq!(addr.align_down().as_u32(), 0x0040_1000);
        assert_eq!(page_align_up(100), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(pages_for(9000), 3);
        assert_eq!(pages_for(0), 0);
    }

    #[test]
    fn test_distance() {
        let a = VirtAddr::new(0x1000);
        let b = VirtAddr::new(0x3000);
        assert_eq!(b.distance_from(a), 0x2000);
        assert_eq!(a.distance_from(b), 0);
    }
}
