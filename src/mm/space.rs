//! Process Address Spaces
//!
//! An address space is a page directory plus three page tables:
//! - data: the process image at [`DATA_BASE`]
//! - stack: [`STACK_PAGES`] pages below [`STACK_TOP`]
//! - heap: regions handed out by the [`Heap`] from [`HEAP_BASE`]
//!
//! The directory starts as a copy of every kernel directory entry, so the
//! kernel's identity mappings and framebuffer are visible in every process.
//! The copy is taken once and never re-synchronized.
//!
//! Directories and tables come from the metadata pool, page contents from
//! the data pool.

use log::{debug, warn};

use alloc::vec::Vec;

use super::address::{pages_for, PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_SIZE};
use super::frame::FrameAllocator;
use super::heap::{FrameBacking, Heap};
use super::paging::{self, Access};
use super::phys::PhysMapper;
use crate::config::{DATA_BASE, HEAP_BASE, HEAP_END, MAX_IMAGE_SIZE, STACK_PAGES, STACK_TOP};
use crate::error::{Result, VmemError};

/// Frames claimed while building an address space, released if the build
/// fails part way.
#[derive(Default)]
struct Claimed {
    metadata: Vec<PhysAddr>,
    data: Vec<PhysAddr>,
}

impl Claimed {
    fn metadata(&mut self, frame: PhysAddr) -> PhysAddr {
        self.metadata.push(frame);
        frame
    }

    fn data(&mut self, frame: PhysAddr) -> PhysAddr {
        self.data.push(frame);
        frame
    }

    fn rollback(self, data_pool: &FrameAllocator, metadata_pool: &FrameAllocator) {
        for frame in self.data {
            if let Err(err) = data_pool.free(frame) {
                warn!("[process] rollback could not return data frame {frame}: {err}");
            }
        }
        for frame in self.metadata {
            if let Err(err) = metadata_pool.free(frame) {
                warn!("[process] rollback could not return table {frame}: {err}");
            }
        }
    }
}

/// Keep the first error while continuing a teardown.
fn keep_first(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}

/// Virtual memory state of one process.
#[derive(Debug)]
pub struct AddressSpace {
    directory: PhysAddr,
    data_table: PhysAddr,
    stack_table: PhysAddr,
    heap_table: PhysAddr,
    data_size: usize,
    heap: Heap,
}

impl AddressSpace {
    /// Build an address space holding `image` and a fresh stack.
    ///
    /// Every frame claimed is returned if any step fails.
    pub fn create<M: PhysMapper>(
        data_pool: &FrameAllocator,
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
        kernel_directory: PhysAddr,
        image: &[u8],
    ) -> Result<Self> {
        if image.len() > MAX_IMAGE_SIZE {
            warn!("[process] image of {} bytes exceeds the data table", image.len());
            return Err(VmemError::ImageTooLarge);
        }

        let mut claimed = Claimed::default();
        match Self::build(data_pool, metadata_pool, mapper, kernel_directory, image, &mut claimed) {
            Ok(space) => Ok(space),
            Err(err) => {
                warn!(
                    "[process] setup failed ({err}), returning {} data and {} metadata frames",
                    claimed.data.len(),
                    claimed.metadata.len()
                );
                claimed.rollback(data_pool, metadata_pool);
                Err(err)
            }
        }
    }

    fn build<M: PhysMapper>(
        data_pool: &FrameAllocator,
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
        kernel_directory: PhysAddr,
        image: &[u8],
        claimed: &mut Claimed,
    ) -> Result<Self> {
        let directory = claimed.metadata(metadata_pool.allocate_zeroed(mapper)?);
        let data_table = claimed.metadata(metadata_pool.allocate_zeroed(mapper)?);
        let stack_table = claimed.metadata(metadata_pool.allocate_zeroed(mapper)?);
        let heap_table = claimed.metadata(metadata_pool.allocate_zeroed(mapper)?);
        debug!("[process] directory {directory}, data {data_table}, stack {stack_table}, heap {heap_table}");

        for index in 0..ENTRIES_PER_TABLE {
            let entry = mapper.table(kernel_directory)[index];
            if !entry.is_unused() {
                mapper.table_mut(directory)[index] = entry;
            }
        }

        let pages = data_pages(image.len());
        for page in 0..pages {
            let frame = claimed.data(data_pool.allocate()?);
            let start = (page * PAGE_SIZE).min(image.len());
            let end = (start + PAGE_SIZE).min(image.len());
            mapper.fill_frame(frame, &image[start..end]);
            mapper
                .table_mut(data_table)
                .map(DATA_BASE.add(page * PAGE_SIZE), frame, Access::User);
        }
        debug!("[process] mapped {pages} data pages");

        for page in 0..STACK_PAGES {
            let frame = claimed.data(data_pool.allocate_zeroed(mapper)?);
            mapper
                .table_mut(stack_table)
                .map(STACK_TOP.sub(page * PAGE_SIZE), frame, Access::User);
        }

        let dir = mapper.table_mut(directory);
        dir.add_table(HEAP_BASE, heap_table, Access::User);
        dir.add_table(STACK_TOP, stack_table, Access::User);
        dir.add_table(DATA_BASE, data_table, Access::User);

        Ok(Self {
            directory,
            data_table,
            stack_table,
            heap_table,
            data_size: image.len(),
            heap: Heap::new(HEAP_BASE, HEAP_END),
        })
    }

    /// Return every frame and table of this address space to its pool.
    ///
    /// Teardown continues past errors and reports the first one.
    pub fn destroy<M: PhysMapper>(
        mut self,
        data_pool: &FrameAllocator,
        metadata_pool: &FrameAllocator,
        mapper: &mut M,
    ) -> Result<()> {
        let mut result = Ok(());

        for page in 0..data_pages(self.data_size) {
            if let Some(frame) = mapper.table(self.data_table).lookup(DATA_BASE.add(page * PAGE_SIZE)) {
                keep_first(&mut result, data_pool.free(frame));
            }
        }
        keep_first(&mut result, metadata_pool.free(self.data_table));

        for page in 0..STACK_PAGES {
            if let Some(frame) = mapper.table(self.stack_table).lookup(STACK_TOP.sub(page * PAGE_SIZE)) {
                keep_first(&mut result, data_pool.free(frame));
            }
        }
        keep_first(&mut result, metadata_pool.free(self.stack_table));

        let mut backing = FrameBacking::new(data_pool, mapper, self.heap_table, Access::User);
        keep_first(&mut result, self.heap.release_all(&mut backing));
        keep_first(&mut result, metadata_pool.free(self.heap_table));

        keep_first(&mut result, metadata_pool.free(self.directory));
        debug!("[process] address space {} released", self.directory);
        result
    }

    /// Allocate `size` bytes of heap.
    pub fn allocate<M: PhysMapper>(&mut self, size: usize, data_pool: &FrameAllocator, mapper: &mut M) -> Result<VirtAddr> {
        let mut backing = FrameBacking::new(data_pool, mapper, self.heap_table, Access::User);
        self.heap.allocate(size, &mut backing)
    }

    /// Free the heap allocation at `address`.
    pub fn free<M: PhysMapper>(&mut self, address: VirtAddr, data_pool: &FrameAllocator, mapper: &mut M) -> Result<()> {
        let mut backing = FrameBacking::new(data_pool, mapper, self.heap_table, Access::User);
        self.heap.free(address, &mut backing)
    }

    /// Physical address of the page directory.
    #[inline]
    pub fn directory(&self) -> PhysAddr {
        self.directory
    }

    /// Size of the process image in bytes.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Bytes of heap currently backed by frames.
    #[inline]
    pub fn used_memory(&self) -> usize {
        self.heap.used_memory()
    }

    /// Heap bookkeeping.
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Resolve `vaddr` through this address space's directory.
    pub fn translate<M: PhysMapper>(&self, mapper: &M, vaddr: VirtAddr) -> Option<PhysAddr> {
        paging::translate(mapper, self.directory, vaddr)
    }
}

/// Data pages mapped for an image of `size` bytes. An empty image still
/// gets one page.
fn data_pages(size: usize) -> usize {
    pages_for(size).max(1)
}
