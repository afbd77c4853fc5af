//! Two-Level Page Table Management
//!
//! Implements the 32-bit two-level translation structure.
//!
//! # Structure (4KB pages)
//! - Directory: 1024 entries, each covers 4MB and points to a table
//! - Table: 1024 entries, each maps one 4KB frame
//!
//! The operations here are stateless: they only compute indices and write
//! entries. Callers guarantee page alignment.

use core::ops::{Index, IndexMut};

use bitflags::bitflags;

use super::address::{PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_MASK};
use super::phys::PhysMapper;

bitflags! {
    /// Page directory and page table entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// Entry is present.
        const PRESENT = 1;
        /// Page is writable.
        const READ_WRITE = 1 << 1;
        /// Page is reachable from user mode.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Set by hardware on first access.
        const ACCESSED = 1 << 5;
    }
}

/// Privilege level a mapping is installed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Kernel only.
    Supervisor,
    /// Kernel and user mode.
    User,
}

impl Access {
    /// Entry flags for this access level.
    #[inline]
    pub const fn flags(self) -> PageFlags {
        match self {
            Self::Supervisor => PageFlags::PRESENT.union(PageFlags::READ_WRITE),
            Self::User => PageFlags::PRESENT
                .union(PageFlags::READ_WRITE)
                .union(PageFlags::USER),
        }
    }
}

/// A single directory or table entry.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Create an invalid (empty) entry.
    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    /// Create an entry pointing at `addr` with `flags`.
    #[inline]
    pub const fn new(addr: PhysAddr, flags: PageFlags) -> Self {
        Self((addr.as_u32() & !PAGE_MASK) | flags.bits())
    }

    /// Check if the entry is zero.
    #[inline]
    pub const fn is_unused(self) -> bool {
        self.0 == 0
    }

    /// Check if the entry is present.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    /// Get the physical address from this entry.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & !PAGE_MASK)
    }

    /// Get the flags from this entry.
    #[inline]
    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & PAGE_MASK)
    }

    /// Get the raw value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Clear the entry.
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_present() {
            write!(f, "PTE(addr={}, flags={:?})", self.addr(), self.flags())
        } else {
            write!(f, "PTE(invalid)")
        }
    }
}

/// A page directory or page table.
///
/// Both levels share the same layout: 1024 four-byte entries in one
/// page-aligned frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    /// Create a new empty table (all entries invalid).
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::invalid(); ENTRIES_PER_TABLE],
        }
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    /// Iterate over all non-zero entries with their indices.
    pub fn iter_used(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| !e.is_unused())
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.fill(PageTableEntry::invalid());
    }

    /// Map the page containing `vaddr` to `paddr`.
    #[inline]
    pub fn map(&mut self, vaddr: VirtAddr, paddr: PhysAddr, access: Access) {
        self.entries[vaddr.table_index()] = PageTableEntry::new(paddr, access.flags());
    }

    /// Remove the mapping for the page containing `vaddr`.
    #[inline]
    pub fn unmap(&mut self, vaddr: VirtAddr) {
        self.entries[vaddr.table_index()].clear();
    }

    /// Frame mapped for the page containing `vaddr`, if present.
    #[inline]
    pub fn lookup(&self, vaddr: VirtAddr) -> Option<PhysAddr> {
        let entry = self.entries[vaddr.table_index()];
        entry.is_present().then(|| entry.addr())
    }

    /// Install `table` into this directory for the 4MB slot containing `vaddr`.
    #[inline]
    pub fn add_table(&mut self, vaddr: VirtAddr, table: PhysAddr, access: Access) {
        self.entries[vaddr.directory_index()] = PageTableEntry::new(table, access.flags());
    }

    /// Table installed in this directory for the slot containing `vaddr`.
    #[inline]
    pub fn table_for(&self, vaddr: VirtAddr) -> Option<PhysAddr> {
        let entry = self.entries[vaddr.directory_index()];
        entry.is_present().then(|| entry.addr())
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk `directory` and resolve `vaddr` to a physical address.
pub fn translate<M: PhysMapper>(mapper: &M, directory: PhysAddr, vaddr: VirtAddr) -> Option<PhysAddr> {
    let table = mapper.table(directory).table_for(vaddr)?;
    let frame = mapper.table(table).lookup(vaddr)?;
    Some(frame.add(vaddr.page_offset()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_unmap() {
        let mut table = PageTable::new();
        let vaddr = VirtAddr::new(0xE000_3000);
        table.map(vaddr, PhysAddr::new(0x0040_5000), Access::User);

        assert_eq!(table.lookup(vaddr), Some(PhysAddr::new(0x0040_5000)));
        assert_eq!(table[3].flags(), Access::User.flags());
        assert_eq!(table[3].as_u32(), 0x0040_5007);

        table.unmap(vaddr);
        assert_eq!(table.lookup(vaddr), None);
        assert_eq!(table.iter_used().count(), 0);
    }

    #[test]
    fn test_add_table() {
        let mut directory = PageTable::new();
        directory.add_table(
            VirtAddr::new(0xE000_0000),
            PhysAddr::new(0x0020_1000),
            Access::Supervisor,
        );
        assert_eq!(directory[0x380].as_u32(), 0x0020_1003);
        assert_eq!(
            directory.table_for(VirtAddr::new(0xE012_3456)),
            Some(PhysAddr::new(0x0020_1000))
        );
        assert_eq!(directory.table_for(VirtAddr::new(0x0000_0000)), None);
    }

    #[test]
    fn test_entry_masks_low_bits() {
        let entry = PageTableEntry::new(PhysAddr::new(0x1234_5678), PageFlags::PRESENT);
        assert_eq!(entry.addr(), PhysAddr::new(0x1234_5000));
        assert!(entry.is_present());
        assert!(!entry.flags().contains(PageFlags::USER));
    }
}
