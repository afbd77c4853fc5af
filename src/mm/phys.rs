//! Physical Memory Access
//!
//! Code can only dereference virtual addresses. Whenever this crate needs to
//! touch a frame (to fill a page table, copy a process image, zero a stack)
//! it goes through a [`PhysMapper`], which turns a physical address into a
//! reference to the frame's contents.
//!
//! # Implementations
//! - [`IdentityMapper`]: the kernel runs with low memory identity-mapped, so
//!   the physical address is the pointer
//! - `SparseMemory` (tests only): frames live in a map on the host heap

use super::address::{PhysAddr, PAGE_SIZE};
use super::paging::PageTable;

/// Contents of one physical frame.
#[repr(C, align(4096))]
pub struct Frame(pub [u8; PAGE_SIZE]);

impl Frame {
    /// A frame full of zeros.
    pub const fn zeroed() -> Self {
        Self([0; PAGE_SIZE])
    }

    /// View the frame as a page directory or page table.
    #[inline]
    pub fn as_table(&self) -> &PageTable {
        // SAFETY: Frame and PageTable have the same size and alignment, and
        // every bit pattern is a valid PageTableEntry.
        unsafe { &*(self as *const Self).cast::<PageTable>() }
    }

    /// View the frame as a mutable page directory or page table.
    #[inline]
    pub fn as_table_mut(&mut self) -> &mut PageTable {
        // SAFETY: see `as_table`.
        unsafe { &mut *(self as *mut Self).cast::<PageTable>() }
    }
}

/// Access to physical frames from the current address space.
pub trait PhysMapper {
    /// Borrow the frame at `pa`.
    fn frame(&self, pa: PhysAddr) -> &Frame;

    /// Mutably borrow the frame at `pa`.
    fn frame_mut(&mut self, pa: PhysAddr) -> &mut Frame;

    /// Borrow the frame at `pa` as a page table.
    #[inline]
    fn table(&self, pa: PhysAddr) -> &PageTable {
        self.frame(pa).as_table()
    }

    /// Mutably borrow the frame at `pa` as a page table.
    #[inline]
    fn table_mut(&mut self, pa: PhysAddr) -> &mut PageTable {
        self.frame_mut(pa).as_table_mut()
    }

    /// Fill the frame at `pa` with zeros.
    fn zero_frame(&mut self, pa: PhysAddr) {
        self.frame_mut(pa).0.fill(0);
    }

    /// Copy `data` to the start of the frame at `pa` and zero the rest.
    fn fill_frame(&mut self, pa: PhysAddr, data: &[u8]) {
        let len = data.len().min(PAGE_SIZE);
        let frame = &mut self.frame_mut(pa).0;
        frame[..len].copy_from_slice(&data[..len]);
        frame[len..].fill(0);
    }
}

/// [`PhysMapper`] for a kernel running with physical memory identity-mapped.
pub struct IdentityMapper {
    _private: (),
}

impl IdentityMapper {
    /// Create the mapper.
    ///
    /// # Safety
    /// Every frame handed to this mapper must be identity-mapped, writable,
    /// and not aliased by any other live reference while borrowed.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PhysMapper for IdentityMapper {
    fn frame(&self, pa: PhysAddr) -> &Frame {
        debug_assert!(pa.is_aligned());
        // SAFETY: guaranteed by the contract of `IdentityMapper::new`.
        unsafe { &*(pa.as_usize() as *const Frame) }
    }

    fn frame_mut(&mut self, pa: PhysAddr) -> &mut Frame {
        debug_assert!(pa.is_aligned());
        // SAFETY: guaranteed by the contract of `IdentityMapper::new`.
        unsafe { &mut *(pa.as_usize() as *mut Frame) }
    }
}

#[cfg(test)]
pub(crate) use sparse::SparseMemory;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address::VirtAddr;
    use crate::mm::paging::Access;

    #[test]
    fn test_fill_frame_zeroes_tail() {
        let mut mem = SparseMemory::new();
        let pa = PhysAddr::new(0x0040_0000);
        mem.frame_mut(pa).0.fill(0xAA);

        mem.fill_frame(pa, &[1, 2, 3]);
        let frame = &mem.frame(pa).0;
        assert_eq!(&frame[..3], &[1, 2, 3]);
        assert!(frame[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_table_view() {
        let mut mem = SparseMemory::new();
        let pa = PhysAddr::new(0x0020_0000);
        mem.table_mut(pa)
            .map(VirtAddr::new(0x1000), PhysAddr::new(0x0040_0000), Access::User);

        assert_eq!(mem.frame(pa).0[4..8], [0x07, 0x00, 0x40, 0x00]);
        assert_eq!(mem.table(pa).lookup(VirtAddr::new(0x1000)), Some(PhysAddr::new(0x0040_0000)));
        // Untouched frames read as zero.
        assert_eq!(mem.table(PhysAddr::new(0x0030_0000)).iter_used().count(), 0);
    }
}
