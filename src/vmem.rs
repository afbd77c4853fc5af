//! Virtual Memory Subsystem
//!
//! [`Vmem`] owns both frame pools, the physical memory mapper and the kernel
//! directory. Every operation the rest of the kernel calls goes through it.
//!
//! # Boot sequence
//! 1. [`Vmem::new`] sets up the data and metadata pools
//! 2. [`Vmem::init_kernel`] builds the kernel directory
//! 3. [`Vmem::map_driver_region`] for each device that needs MMIO
//! 4. [`Vmem::init_process`] / [`Vmem::cleanup_process`] per process
//!
//! # Concurrency
//! The kernel is single-core and cooperatively scheduled. The pools lock
//! their bitmaps; the address spaces are owned by their process and need no
//! lock.

use log::{info, warn};

use crate::config::{VideoMode, VmemConfig, HEAP_BASE, HEAP_END};
use crate::error::{Result, VmemError};
use crate::mm::{
    paging, Access, AddressSpace, FrameAllocator, FrameBacking, Heap, KernelSpace, PhysAddr, PhysMapper, VirtAddr,
};
use crate::process::ProcessControlBlock;

/// Virtual memory context.
pub struct Vmem<M: PhysMapper> {
    data: FrameAllocator,
    metadata: FrameAllocator,
    mapper: M,
    config: VmemConfig,
    kernel: Option<KernelSpace>,
    kernel_heap: Heap,
}

impl<M: PhysMapper> Vmem<M> {
    /// Create the frame pools described by `config`.
    pub fn new(config: VmemConfig, mapper: M) -> Self {
        let data = FrameAllocator::new("data", config.data_pool.clone());
        let metadata = FrameAllocator::new("metadata", config.metadata_pool.clone());
        info!(
            "[vmem] {} data frames, {} metadata frames",
            data.total_frames(),
            metadata.total_frames()
        );

        Self {
            data,
            metadata,
            mapper,
            config,
            kernel: None,
            kernel_heap: Heap::new(HEAP_BASE, HEAP_END),
        }
    }

    /// Build the kernel address space.
    ///
    /// # Panics
    /// Panics if the kernel directory cannot be built. Use
    /// [`Vmem::try_init_kernel`] to handle the error instead.
    pub fn init_kernel(&mut self, video: &VideoMode) {
        if let Err(err) = self.try_init_kernel(video) {
            panic!("kernel address space setup failed: {err}");
        }
    }

    /// Build the kernel address space, reporting failure.
    ///
    /// A second call leaves the existing kernel directory in place.
    pub fn try_init_kernel(&mut self, video: &VideoMode) -> Result<()> {
        if self.kernel.is_some() {
            warn!("[vmem] kernel address space already initialized");
            return Ok(());
        }

        let kernel = KernelSpace::create(
            &self.metadata,
            &mut self.mapper,
            self.config.identity_map_end,
            video,
        )?;
        self.kernel = Some(kernel);
        Ok(())
    }

    /// Create the address space of `pcb` and load `data` as its image.
    pub fn init_process<P: ProcessControlBlock>(&mut self, pcb: &mut P, data: &[u8]) -> Result<()> {
        let kernel = self.kernel.ok_or(VmemError::NotInitialized)?;
        if pcb.address_space().is_some() {
            warn!("[vmem] pid {} already has an address space", pcb.pid());
            return Err(VmemError::AllocationConsistency);
        }

        let space = AddressSpace::create(
            &self.data,
            &self.metadata,
            &mut self.mapper,
            kernel.directory(),
            data,
        )?;
        info!(
            "[vmem] pid {}: directory {}, {} byte image",
            pcb.pid(),
            space.directory(),
            data.len()
        );
        pcb.set_address_space(space);
        Ok(())
    }

    /// Release every frame owned by the address space of `pcb`.
    pub fn cleanup_process<P: ProcessControlBlock>(&mut self, pcb: &mut P) -> Result<()> {
        let space = pcb.take_address_space().ok_or(VmemError::NotInitialized)?;
        let used = space.used_memory();
        space.destroy(&self.data, &self.metadata, &mut self.mapper)?;
        info!("[vmem] pid {}: address space released ({used} heap bytes)", pcb.pid());
        Ok(())
    }

    /// Allocate `size` bytes on the heap of `pcb`.
    pub fn stack_alloc<P: ProcessControlBlock>(&mut self, pcb: &mut P, size: usize) -> Result<VirtAddr> {
        let space = pcb.address_space_mut().ok_or(VmemError::NotInitialized)?;
        space.allocate(size, &self.data, &mut self.mapper)
    }

    /// Free the heap allocation of `pcb` at `addr`.
    pub fn stack_free<P: ProcessControlBlock>(&mut self, pcb: &mut P, addr: VirtAddr) -> Result<()> {
        let space = pcb.address_space_mut().ok_or(VmemError::NotInitialized)?;
        space.free(addr, &self.data, &mut self.mapper)
    }

    /// Identity-map `pages` pages of device memory at `addr` for the kernel.
    pub fn map_driver_region(&mut self, addr: PhysAddr, pages: usize) -> Result<()> {
        let kernel = self.kernel.ok_or(VmemError::NotInitialized)?;
        kernel.map_identity(&self.metadata, &mut self.mapper, addr, pages)?;
        info!("[vmem] driver region {addr} ({pages} pages) mapped");
        Ok(())
    }

    /// Allocate `size` bytes on the kernel heap.
    ///
    /// Regions are mapped with supervisor access into the kernel heap table.
    pub fn kernel_alloc(&mut self, size: usize) -> Result<VirtAddr> {
        let kernel = self.kernel.ok_or(VmemError::NotInitialized)?;
        let mut backing = FrameBacking::new(&self.data, &mut self.mapper, kernel.heap_table(), Access::Supervisor);
        self.kernel_heap.allocate(size, &mut backing)
    }

    /// Free the kernel heap allocation at `addr`.
    pub fn kernel_free(&mut self, addr: VirtAddr) -> Result<()> {
        let kernel = self.kernel.ok_or(VmemError::NotInitialized)?;
        let mut backing = FrameBacking::new(&self.data, &mut self.mapper, kernel.heap_table(), Access::Supervisor);
        self.kernel_heap.free(addr, &mut backing)
    }

    /// Kernel heap bookkeeping.
    pub fn kernel_heap(&self) -> &Heap {
        &self.kernel_heap
    }

    /// Physical address of the kernel directory, once built.
    pub fn kernel_directory(&self) -> Option<PhysAddr> {
        self.kernel.map(|kernel| kernel.directory())
    }

    /// Resolve `vaddr` through `directory`.
    pub fn translate(&self, directory: PhysAddr, vaddr: VirtAddr) -> Option<PhysAddr> {
        paging::translate(&self.mapper, directory, vaddr)
    }

    /// Pool backing page contents.
    pub fn data_pool(&self) -> &FrameAllocator {
        &self.data
    }

    /// Pool backing directories and tables.
    pub fn metadata_pool(&self) -> &FrameAllocator {
        &self.metadata
    }

    /// Physical memory access.
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Configuration this context was built from.
    pub fn config(&self) -> &VmemConfig {
        &self.config
    }
}
