//! Kernel Address Space
//!
//! Builds the kernel page directory at boot and extends it with device
//! mappings afterwards.
//!
//! # Layout
//! - Physical `0..identity_map_end` identity-mapped, one table per 4MB slot
//! - An empty kernel heap table installed at [`HEAP_BASE`]
//! - The boot framebuffer identity-mapped
//!
//! All mappings use supervisor access. Every table, including the ones
//! backing the identity map, comes from the metadata pool. Process
//! directories copy these entries when they are created, so device regions
//! mapped later are only visible to processes created afterwards.

use alloc::vec::Vec;

use log::{debug, info, warn};

use super::address::{PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_SIZE};
use super::frame::FrameAllocator;
use super::paging::{Access, PageTableEntry};
use super::phys::PhysMapper;
use crate::config::{VideoMode, HEAP_BASE};
use crate::error::{Result, VmemError};

/// The kernel page directory and its heap table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSpace {
    directory: PhysAddr,
    heap_table: PhysAddr,
}

impl KernelSpace {
    /// Allocate and populate the kernel directory.
    ///
    /// On failure every table claimed so far is returned to `metadata_pool`.
    pub fn create<M: PhysMapper>(
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
        identity_map_end: PhysAddr,
        video: &VideoMode,
    ) -> Result<Self> {
        let directory = metadata_pool.allocate_zeroed(mapper)?;

        match Self::populate(metadata_pool, mapper, directory, identity_map_end, video) {
            Ok(heap_table) => {
                info!(
                    "[kernel] directory at {directory}, {} MiB identity-mapped, framebuffer at {}",
                    identity_map_end.as_usize() >> 20,
                    video.framebuffer
                );
                Ok(Self { directory, heap_table })
            }
            Err(err) => {
                warn!("[kernel] address space setup failed: {err}");
                release_tables(metadata_pool, mapper, directory);
                if let Err(free_err) = metadata_pool.free(directory) {
                    warn!("[kernel] rollback could not return directory {directory}: {free_err}");
                }
                Err(err)
            }
        }
    }

    fn populate<M: PhysMapper>(
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
        directory: PhysAddr,
        identity_map_end: PhysAddr,
        video: &VideoMode,
    ) -> Result<PhysAddr> {
        let low_pages = identity_map_end.as_usize() / PAGE_SIZE;
        identity_map(metadata_pool, mapper, directory, PhysAddr::new(0), low_pages)?;

        let heap_table = metadata_pool.allocate_zeroed(mapper)?;
        mapper
            .table_mut(directory)
            .add_table(HEAP_BASE, heap_table, Access::Supervisor);
        debug!("[kernel] heap table at {heap_table}");

        identity_map(metadata_pool, mapper, directory, video.framebuffer, video.pages())?;
        Ok(heap_table)
    }

    /// Identity-map `pages` pages from `addr` into the kernel directory.
    pub fn map_identity<M: PhysMapper>(
        &self,
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
        addr: PhysAddr,
        pages: usize,
    ) -> Result<()> {
        identity_map(metadata_pool, mapper, self.directory, addr, pages)
    }

    /// Physical address of the kernel directory.
    #[inline]
    pub fn directory(&self) -> PhysAddr {
        self.directory
    }

    /// Physical address of the kernel heap table.
    #[inline]
    pub fn heap_table(&self) -> PhysAddr {
        self.heap_table
    }
}

/// Identity-map `pages` pages starting at the page containing `start`.
///
/// Missing tables are allocated first; tables already installed are reused.
/// If a table cannot be allocated, the tables created by this call are
/// removed and nothing is mapped.
fn identity_map<M: PhysMapper>(
    metadata_pool: &FrameAllocator,
    mapper: &mut M,
    directory: PhysAddr,
    start: PhysAddr,
    pages: usize,
) -> Result<()> {
    if pages == 0 {
        return Ok(());
    }

    let start = start.align_down();
    let last = u64::from(start.as_u32()) + (pages as u64 - 1) * PAGE_SIZE as u64;
    if last > u64::from(u32::MAX) {
        warn!("[kernel] identity map of {pages} pages at {start} wraps the address space");
        return Err(VmemError::InvalidAddress);
    }
    let first_slot = start.identity().directory_index();
    let last_slot = VirtAddr::new(last as u32).directory_index();

    let mut created: Vec<usize> = Vec::new();
    for slot in first_slot..=last_slot {
        if mapper.table(directory)[slot].is_present() {
            continue;
        }
        match metadata_pool.allocate_zeroed(mapper) {
            Ok(table) => {
                mapper.table_mut(directory)[slot] = PageTableEntry::new(table, Access::Supervisor.flags());
                created.push(slot);
            }
            Err(err) => {
                for slot in created {
                    let entry = mapper.table(directory)[slot];
                    mapper.table_mut(directory)[slot].clear();
                    if let Err(free_err) = metadata_pool.free(entry.addr()) {
                        warn!("[kernel] rollback could not return table {}: {free_err}", entry.addr());
                    }
                }
                return Err(err);
            }
        }
    }

    for page in 0..pages {
        let pa = start.add(page * PAGE_SIZE);
        let va = pa.identity();
        let table = mapper
            .table(directory)
            .table_for(va)
            .ok_or(VmemError::AllocationConsistency)?;
        mapper.table_mut(table).map(va, pa, Access::Supervisor);
    }

    debug!(
        "[kernel] identity-mapped {pages} pages at {start} ({} new tables)",
        created.len()
    );
    Ok(())
}

/// Free every table installed in `directory`.
fn release_tables<M: PhysMapper>(metadata_pool: &FrameAllocator, mapper: &mut M, directory: PhysAddr) {
    for slot in 0..ENTRIES_PER_TABLE {
        let entry = mapper.table(directory)[slot];
        if entry.is_present() {
            mapper.table_mut(directory)[slot].clear();
            if let Err(err) = metadata_pool.free(entry.addr()) {
                warn!("[kernel] could not return table {}: {err}", entry.addr());
            }
        }
    }
}
