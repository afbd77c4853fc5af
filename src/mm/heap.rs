//! Per-Process Heap Allocator
//!
//! Hands out variable-sized allocations on top of page-granular memory.
//!
//! # Design
//! - A *region* is a run of frames mapped contiguously into the heap's
//!   virtual range. It counts the allocations that point at it and gives its
//!   frames back only when the last one is freed.
//! - An *allocation* is one caller-visible request. Allocations form a list
//!   in ascending address order, linked by handle through an arena.
//! - New allocations go, in order of preference: at the heap base when it is
//!   free, into a gap inside one region, at the unused tail of a region that
//!   is followed by another region, at the tail of the last region, and
//!   finally into a new region after the last one.
//!
//! Free space is never merged across a region boundary, even when the
//! combined gap would fit a request.
//!
//! # Cost
//! Allocation and free walk the list, O(n) in the number of live
//! allocations.

use alloc::vec::Vec;

use log::{debug, warn};

use super::address::{page_align_up, PhysAddr, VirtAddr, PAGE_SIZE};
use super::frame::FrameAllocator;
use super::paging::Access;
use super::phys::PhysMapper;
use crate::error::{Result, VmemError};

/// Slot storage with reusable handles.
#[derive(Debug)]
struct Arena<T> {
    slots: Vec<Option<T>>,
    vacant: Vec<usize>,
}

impl<T> Arena<T> {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> usize {
        if let Some(index) = self.vacant.pop() {
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.vacant.push(index);
        Some(value)
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }
}

/// Handle of a region in the heap's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegionId(usize);

/// Handle of an allocation in the heap's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllocId(usize);

/// Frames mapped contiguously into the heap.
#[derive(Debug)]
struct Region {
    /// One frame per page, in virtual order.
    frames: Vec<PhysAddr>,
    base: VirtAddr,
    /// Size in bytes, always whole pages.
    size: usize,
    /// Bytes handed out to allocations.
    used: usize,
    /// Allocations pointing at this region.
    refs: usize,
}

impl Region {
    fn end(&self) -> VirtAddr {
        self.base.add(self.size)
    }
}

#[derive(Debug)]
struct Allocation {
    address: VirtAddr,
    /// Requested size in bytes.
    size: usize,
    region: RegionId,
    next: Option<AllocId>,
}

impl Allocation {
    fn end(&self) -> VirtAddr {
        self.address.add(self.size)
    }
}

/// Supplies and reclaims the frames behind heap regions.
pub trait RegionBacking {
    /// Back `pages` pages starting at `base` and return the frames in order.
    ///
    /// On failure nothing stays claimed.
    fn back(&mut self, base: VirtAddr, pages: usize) -> Result<Vec<PhysAddr>>;

    /// Unmap the pages starting at `base` and return `frames`.
    fn release(&mut self, base: VirtAddr, frames: &[PhysAddr]) -> Result<()>;
}

/// [`RegionBacking`] that takes frames from a pool and maps them into a heap
/// page table.
pub struct FrameBacking<'a, M: PhysMapper> {
    pool: &'a FrameAllocator,
    mapper: &'a mut M,
    table: PhysAddr,
    access: Access,
}

impl<'a, M: PhysMapper> FrameBacking<'a, M> {
    /// Back regions with frames from `pool`, mapped into `table`.
    pub fn new(pool: &'a FrameAllocator, mapper: &'a mut M, table: PhysAddr, access: Access) -> Self {
        Self {
            pool,
            mapper,
            table,
            access,
        }
    }
}

impl<M: PhysMapper> RegionBacking for FrameBacking<'_, M> {
    fn back(&mut self, base: VirtAddr, pages: usize) -> Result<Vec<PhysAddr>> {
        let mut frames = Vec::with_capacity(pages);
        for i in 0..pages {
            match self.pool.allocate_zeroed(self.mapper) {
                Ok(frame) => {
                    self.mapper
                        .table_mut(self.table)
                        .map(base.add(i * PAGE_SIZE), frame, self.access);
                    frames.push(frame);
                }
                Err(err) => {
                    warn!("[heap] region at {base} failed after {i}/{pages} pages, rolling back");
                    if let Err(release_err) = self.release(base, &frames) {
                        warn!("[heap] rollback of region at {base} failed: {release_err}");
                    }
                    return Err(err);
                }
            }
        }
        Ok(frames)
    }

    fn release(&mut self, base: VirtAddr, frames: &[PhysAddr]) -> Result<()> {
        let mut result = Ok(());
        for (i, &frame) in frames.iter().enumerate() {
            self.mapper.table_mut(self.table).unmap(base.add(i * PAGE_SIZE));
            if let Err(err) = self.pool.free(frame) {
                result = Err(err);
            }
        }
        result
    }
}

/// Heap bookkeeping for one address space.
#[derive(Debug)]
pub struct Heap {
    base: VirtAddr,
    limit: VirtAddr,
    allocations: Arena<Allocation>,
    regions: Arena<Region>,
    head: Option<AllocId>,
    used_memory: usize,
}

impl Heap {
    /// Create an empty heap spanning `base..limit`.
    pub const fn new(base: VirtAddr, limit: VirtAddr) -> Self {
        Self {
            base,
            limit,
            allocations: Arena::new(),
            regions: Arena::new(),
            head: None,
            used_memory: 0,
        }
    }

    /// Lowest heap address.
    #[inline]
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// Bytes of heap currently backed by frames.
    #[inline]
    pub fn used_memory(&self) -> usize {
        self.used_memory
    }

    /// Number of live allocations.
    #[inline]
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Number of live regions.
    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Whether the heap holds no allocations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterate over `(address, size)` of every allocation in address order.
    pub fn allocations(&self) -> Allocations<'_> {
        Allocations {
            heap: self,
            cursor: self.head,
        }
    }

    fn alloc(&self, id: AllocId) -> Result<&Allocation> {
        self.allocations
            .get(id.0)
            .ok_or(VmemError::AllocationConsistency)
    }

    fn alloc_mut(&mut self, id: AllocId) -> Result<&mut Allocation> {
        self.allocations
            .get_mut(id.0)
            .ok_or(VmemError::AllocationConsistency)
    }

    fn region(&self, id: RegionId) -> Result<&Region> {
        self.regions.get(id.0).ok_or(VmemError::AllocationConsistency)
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region> {
        self.regions
            .get_mut(id.0)
            .ok_or(VmemError::AllocationConsistency)
    }

    /// Allocate `requested` bytes and return the allocation's address.
    pub fn allocate<B: RegionBacking>(&mut self, requested: usize, backing: &mut B) -> Result<VirtAddr> {
        let requested = requested.max(1);
        if requested > self.limit.distance_from(self.base) {
            warn!("[heap] request of {requested} bytes exceeds the heap");
            return Err(VmemError::OutOfHeapSpace);
        }
        let pages = page_align_up(requested) / PAGE_SIZE;

        let Some(head) = self.head else {
            let region = self.new_region(self.base, pages, backing)?;
            let id = self.attach(region, self.base, requested, None)?;
            debug!("[heap] first allocation of {requested} bytes at {}", self.base);
            return Ok(self.alloc(id)?.address);
        };

        // The heap base is free when the first allocation starts above it.
        let (head_address, head_region) = {
            let first = self.alloc(head)?;
            (first.address, first.region)
        };
        let head_region_base = self.region(head_region)?.base;
        if head_region_base > self.base && self.base.add(pages * PAGE_SIZE) <= head_region_base {
            let region = self.new_region(self.base, pages, backing)?;
            self.attach(region, self.base, requested, None)?;
            debug!("[heap] reused heap base for {requested} bytes in new region");
            return Ok(self.base);
        }
        if head_region_base == self.base && head_address.distance_from(self.base) >= requested {
            self.attach(head_region, self.base, requested, None)?;
            debug!("[heap] reused heap base for {requested} bytes in first region");
            return Ok(self.base);
        }

        let mut iter = head;
        while let Some(next) = self.alloc(iter)?.next {
            let (region, end) = {
                let current = self.alloc(iter)?;
                (current.region, current.end())
            };
            let (next_region, next_address) = {
                let following = self.alloc(next)?;
                (following.region, following.address)
            };

            // Gap between two allocations of the same region.
            if next_address.distance_from(end) >= requested && region == next_region {
                self.attach(region, end, requested, Some(iter))?;
                debug!("[heap] {requested} bytes at {end} in region gap");
                return Ok(end);
            }

            // Unused tail of a region followed by a different region.
            let tail = self.region(region)?.end().distance_from(end);
            if region != next_region && tail >= requested {
                self.attach(region, end, requested, Some(iter))?;
                debug!("[heap] {requested} bytes at {end} in region tail");
                return Ok(end);
            }

            iter = next;
        }

        // Tail of the last region.
        let (region, end) = {
            let last = self.alloc(iter)?;
            (last.region, last.end())
        };
        let region_end = self.region(region)?.end();
        if region_end.distance_from(end) >= requested {
            self.attach(region, end, requested, Some(iter))?;
            debug!("[heap] {requested} bytes at {end} at end of last region");
            return Ok(end);
        }

        // New region after the last one.
        let base = region_end;
        if self.limit.distance_from(base) < pages * PAGE_SIZE {
            warn!("[heap] no room for {pages} pages at {base}");
            return Err(VmemError::OutOfHeapSpace);
        }
        let region = self.new_region(base, pages, backing)?;
        self.attach(region, base, requested, Some(iter))?;
        debug!("[heap] {requested} bytes at {base} in new region of {pages} pages");
        Ok(base)
    }

    /// Free the allocation starting at `address`.
    pub fn free<B: RegionBacking>(&mut self, address: VirtAddr, backing: &mut B) -> Result<()> {
        let Some(head) = self.head else {
            warn!("[heap] free of {address} on empty heap");
            return Err(VmemError::InvalidAddress);
        };

        let removed = if self.alloc(head)?.address == address {
            self.head = self.alloc(head)?.next;
            head
        } else {
            let mut iter = head;
            loop {
                let Some(next) = self.alloc(iter)?.next else {
                    warn!("[heap] free of unknown address {address}");
                    return Err(VmemError::InvalidAddress);
                };
                if self.alloc(next)?.address == address {
                    let after = self.alloc(next)?.next;
                    self.alloc_mut(iter)?.next = after;
                    break next;
                }
                iter = next;
            }
        };

        let allocation = self
            .allocations
            .remove(removed.0)
            .ok_or(VmemError::AllocationConsistency)?;
        debug!("[heap] freed {} bytes at {}", allocation.size, allocation.address);
        self.release_reference(allocation.region, allocation.size, backing)
    }

    /// Free every allocation, returning all region frames exactly once.
    pub fn release_all<B: RegionBacking>(&mut self, backing: &mut B) -> Result<()> {
        while let Some(head) = self.head {
            let address = self.alloc(head)?.address;
            self.free(address, backing)?;
        }
        Ok(())
    }

    /// Log every region and allocation.
    pub fn dump(&self) {
        debug!(" ------- Memory Stack --------");
        let mut current = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(allocation) = self.allocations.get(id.0) else {
                break;
            };
            if current != Some(allocation.region) {
                current = Some(allocation.region);
                if let Some(region) = self.regions.get(allocation.region.0) {
                    debug!(
                        " ------- Region {} ({}/{}, {} refs) --------",
                        region.base, region.used, region.size, region.refs
                    );
                }
            }
            debug!("     {} --- size {}", allocation.address, allocation.size);
            cursor = allocation.next;
        }
        debug!(" -------     &End     --------");
    }

    fn new_region<B: RegionBacking>(&mut self, base: VirtAddr, pages: usize, backing: &mut B) -> Result<RegionId> {
        let frames = backing.back(base, pages)?;
        let size = pages * PAGE_SIZE;
        self.used_memory += size;
        debug!("[heap] region of {pages} pages at {base}");
        Ok(RegionId(self.regions.insert(Region {
            frames,
            base,
            size,
            used: 0,
            refs: 0,
        })))
    }

    /// Record an allocation in `region` and link it after `prev`, or at the
    /// head when `prev` is `None`.
    fn attach(&mut self, region: RegionId, address: VirtAddr, size: usize, prev: Option<AllocId>) -> Result<AllocId> {
        let next = match prev {
            Some(prev) => self.alloc(prev)?.next,
            None => self.head,
        };

        let target = self.region_mut(region)?;
        target.used += size;
        target.refs += 1;

        let id = AllocId(self.allocations.insert(Allocation {
            address,
            size,
            region,
            next,
        }));
        match prev {
            Some(prev) => self.alloc_mut(prev)?.next = Some(id),
            None => self.head = Some(id),
        }
        Ok(id)
    }

    fn release_reference<B: RegionBacking>(&mut self, id: RegionId, size: usize, backing: &mut B) -> Result<()> {
        let region = self.region_mut(id)?;
        region.refs = region
            .refs
            .checked_sub(1)
            .ok_or(VmemError::AllocationConsistency)?;
        region.used = region.used.saturating_sub(size);
        if region.refs > 0 {
            return Ok(());
        }

        let region = self
            .regions
            .remove(id.0)
            .ok_or(VmemError::AllocationConsistency)?;
        self.used_memory -= region.size;
        debug!("[heap] releasing {} pages at {}", region.frames.len(), region.base);
        backing.release(region.base, &region.frames)
    }
}

/// Iterator over the allocations of a [`Heap`] in address order.
pub struct Allocations<'a> {
    heap: &'a Heap,
    cursor: Option<AllocId>,
}

impl Iterator for Allocations<'_> {
    type Item = (VirtAddr, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let allocation = self.heap.allocations.get(self.cursor?.0)?;
        self.cursor = allocation.next;
        Some((allocation.address, allocation.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HEAP_BASE, HEAP_END};
    use crate::logger::{self, SerialLogger};
    use crate::mm::phys::SparseMemory;
    use log::LevelFilter;

    const H: VirtAddr = HEAP_BASE;
    const TABLE: PhysAddr = PhysAddr::new(0x0020_0000);

    struct Fixture {
        pool: FrameAllocator,
        mem: SparseMemory,
        heap: Heap,
    }

    impl Fixture {
        fn new(frames: u32) -> Self {
            let start = PhysAddr::new(0x0040_0000);
            Self {
                pool: FrameAllocator::new("data", start..start.add(frames as usize * PAGE_SIZE)),
                mem: SparseMemory::new(),
                heap: Heap::new(HEAP_BASE, HEAP_END),
            }
        }

        fn alloc(&mut self, size: usize) -> Result<VirtAddr> {
            let mut backing = FrameBacking::new(&self.pool, &mut self.mem, TABLE, Access::User);
            self.heap.allocate(size, &mut backing)
        }

        fn free(&mut self, address: VirtAddr) -> Result<()> {
            let mut backing = FrameBacking::new(&self.pool, &mut self.mem, TABLE, Access::User);
            self.heap.free(address, &mut backing)
        }

        fn mapped(&self, address: VirtAddr) -> Option<PhysAddr> {
            self.mem.table(TABLE).lookup(address)
        }

        /// Region of `pages` at `base` holding allocations at the given
        /// `(offset, size)` pairs.
        fn region_with(&mut self, base: VirtAddr, pages: usize, allocations: &[(usize, usize)]) {
            let mut backing = FrameBacking::new(&self.pool, &mut self.mem, TABLE, Access::User);
            let region = self.heap.new_region(base, pages, &mut backing).unwrap();
            let mut prev = self.last();
            for &(offset, size) in allocations {
                prev = Some(self.heap.attach(region, base.add(offset), size, prev).unwrap());
            }
        }

        fn last(&self) -> Option<AllocId> {
            let mut cursor = self.heap.head?;
            while let Some(next) = self.heap.alloc(cursor).unwrap().next {
                cursor = next;
            }
            Some(cursor)
        }

        fn assert_consistent(&self) {
            let list: Vec<_> = self.heap.allocations().collect();
            for pair in list.windows(2) {
                assert!(pair[0].0.add(pair[0].1) <= pair[1].0, "overlap: {pair:?}");
            }

            let mut refs = vec![0; self.heap.regions.slots.len()];
            let mut cursor = self.heap.head;
            while let Some(id) = cursor {
                let allocation = self.heap.alloc(id).unwrap();
                let region = self.heap.region(allocation.region).unwrap();
                assert!(allocation.address >= region.base && allocation.end() <= region.end());
                refs[allocation.region.0] += 1;
                cursor = allocation.next;
            }
            for (index, slot) in self.heap.regions.slots.iter().enumerate() {
                if let Some(region) = slot {
                    assert_eq!(region.refs, refs[index]);
                    assert!(region.refs > 0, "empty region kept alive");
                }
            }

            let frames: usize = self
                .heap
                .regions
                .slots
                .iter()
                .flatten()
                .map(|region| region.frames.len())
                .sum();
            assert_eq!(frames, self.pool.used_frames());
            assert_eq!(frames * PAGE_SIZE, self.heap.used_memory());
        }
    }

    #[test]
    fn test_first_allocations() {
        let mut fx = Fixture::new(16);

        let first = fx.alloc(100).unwrap();
        assert_eq!(first, H);
        let second = fx.alloc(4000).unwrap();
        assert_eq!(second, H.add(4096));
        assert_eq!(fx.heap.region_count(), 2);
        fx.assert_consistent();

        fx.free(first).unwrap();
        assert_eq!(fx.mapped(H), None);
        assert_eq!(fx.alloc(100).unwrap(), H);
        assert!(fx.mapped(H).is_some());
        fx.assert_consistent();
    }

    #[test]
    fn test_gap_inside_region_is_reused() {
        let mut fx = Fixture::new(16);
        fx.region_with(H, 3, &[(0, 4096), (8192, 4096)]);
        let used = fx.pool.used_frames();

        assert_eq!(fx.alloc(4096).unwrap(), H.add(4096));
        assert_eq!(fx.heap.region_count(), 1);
        assert_eq!(fx.pool.used_frames(), used);
        fx.assert_consistent();
    }

    #[test]
    fn test_freed_front_of_region_is_reused() {
        let mut fx = Fixture::new(16);
        fx.region_with(H, 3, &[(0, 4096), (8192, 4096)]);
        let used = fx.pool.used_frames();

        fx.free(H).unwrap();
        assert_eq!(fx.heap.region_count(), 1);
        assert!(fx.mapped(H).is_some());

        assert_eq!(fx.alloc(4096).unwrap(), H);
        assert_eq!(fx.heap.region_count(), 1);
        assert_eq!(fx.pool.used_frames(), used);
        assert_eq!(fx.heap.allocations().next(), Some((H, 4096)));
        fx.assert_consistent();
    }

    #[test]
    fn test_front_reuse_needs_room() {
        let mut fx = Fixture::new(16);
        fx.region_with(H, 2, &[(0, 100), (100, 200)]);

        fx.free(H).unwrap();
        // 101 bytes do not fit below H+100.
        assert_eq!(fx.alloc(101).unwrap(), H.add(300));
        assert_eq!(fx.alloc(100).unwrap(), H);
        assert_eq!(fx.heap.region_count(), 1);
        fx.assert_consistent();
    }

    #[test]
    fn test_freed_middle_is_reused() {
        let mut fx = Fixture::new(16);
        fx.region_with(H, 3, &[(0, 4096), (4096, 4096), (8192, 4096)]);

        fx.free(H.add(4096)).unwrap();
        assert_eq!(fx.heap.region_count(), 1);
        assert!(fx.mapped(H.add(4096)).is_some());

        assert_eq!(fx.alloc(2000).unwrap(), H.add(4096));
        fx.assert_consistent();
    }

    #[test]
    fn test_tail_of_region_before_other_region() {
        let mut fx = Fixture::new(16);
        fx.region_with(H, 2, &[(0, 100)]);
        fx.region_with(H.add(8192), 1, &[(0, 100)]);

        assert_eq!(fx.alloc(5000).unwrap(), H.add(100));
        assert_eq!(fx.heap.region_count(), 2);
        fx.assert_consistent();
    }

    #[test]
    fn test_gap_across_regions_not_merged() {
        let mut fx = Fixture::new(16);
        // Free span H+100..H+8192 straddles the boundary at H+4096.
        fx.region_with(H, 1, &[(0, 100)]);
        fx.region_with(H.add(4096), 2, &[(4096, 4096)]);

        let address = fx.alloc(5000).unwrap();
        assert_eq!(address, H.add(12288));
        assert_eq!(fx.heap.region_count(), 3);
        fx.assert_consistent();
    }

    #[test]
    fn test_shared_region_released_on_last_reference() {
        let mut fx = Fixture::new(16);
        let a = fx.alloc(100).unwrap();
        let b = fx.alloc(200).unwrap();
        assert_eq!(b, H.add(100));
        assert_eq!(fx.heap.region_count(), 1);

        fx.free(a).unwrap();
        assert_eq!(fx.pool.used_frames(), 1);
        let c = fx.alloc(100).unwrap();
        assert_eq!(c, H);
        assert_eq!(fx.pool.used_frames(), 1);
        fx.free(c).unwrap();
        fx.free(b).unwrap();
        assert_eq!(fx.pool.used_frames(), 0);
        assert_eq!(fx.heap.used_memory(), 0);
        assert!(fx.heap.is_empty());
    }

    #[test]
    fn test_free_unknown_address() {
        let mut fx = Fixture::new(4);
        assert_eq!(fx.free(H), Err(VmemError::InvalidAddress));

        let a = fx.alloc(64).unwrap();
        assert_eq!(fx.free(a.add(8)), Err(VmemError::InvalidAddress));
        fx.free(a).unwrap();
        assert_eq!(fx.free(a), Err(VmemError::InvalidAddress));
    }

    #[test]
    fn test_out_of_frames_rolls_back() {
        let mut fx = Fixture::new(2);
        assert_eq!(fx.alloc(3 * 4096), Err(VmemError::OutOfPhysicalMemory));
        assert_eq!(fx.pool.used_frames(), 0);
        assert_eq!(fx.mapped(H), None);
        assert_eq!(fx.mapped(H.add(4096)), None);
        assert!(fx.heap.is_empty());
    }

    #[test]
    fn test_heap_span_exhausted() {
        let mut fx = Fixture::new(2048);
        assert_eq!(fx.alloc(HEAP_END.distance_from(H) + 1), Err(VmemError::OutOfHeapSpace));

        fx.alloc(HEAP_END.distance_from(H) - 4096).unwrap();
        fx.alloc(4096).unwrap();
        assert_eq!(fx.alloc(1), Err(VmemError::OutOfHeapSpace));
        fx.assert_consistent();
    }

    #[test]
    fn test_zero_byte_request() {
        let mut fx = Fixture::new(4);
        let a = fx.alloc(0).unwrap();
        let b = fx.alloc(0).unwrap();
        assert_ne!(a, b);
        fx.assert_consistent();
    }

    #[test]
    fn test_release_all() {
        let mut fx = Fixture::new(32);
        for size in [10, 5000, 300, 9000, 1] {
            fx.alloc(size).unwrap();
        }
        assert!(fx.pool.used_frames() > 0);

        let mut backing = FrameBacking::new(&fx.pool, &mut fx.mem, TABLE, Access::User);
        fx.heap.release_all(&mut backing).unwrap();
        assert_eq!(fx.pool.used_frames(), 0);
        assert_eq!(fx.heap.region_count(), 0);
        assert_eq!(fx.heap.allocation_count(), 0);
        assert_eq!(fx.mem.table(TABLE).iter_used().count(), 0);
    }

    #[test]
    fn test_dump_lists_regions_and_allocations() {
        static CAPTURE: SerialLogger<String> = SerialLogger::new(String::new(), LevelFilter::Debug);
        logger::init(&CAPTURE).unwrap();

        let mut fx = Fixture::new(16);
        fx.region_with(H, 2, &[(0, 123), (200, 4567)]);
        fx.region_with(H.add(8192), 1, &[(0, 77)]);
        fx.heap.dump();

        let out = CAPTURE.with_sink(|sink| sink.clone());
        for line in [
            "Region 0xe0000000 (4690/8192, 2 refs)",
            "0xe0000000 --- size 123",
            "0xe00000c8 --- size 4567",
            "Region 0xe0002000 (77/4096, 1 refs)",
            "0xe0002000 --- size 77",
        ] {
            assert!(out.contains(line), "missing {line:?} in:\n{out}");
        }
    }

    #[test]
    fn test_interleaved_ordering() {
        let mut fx = Fixture::new(256);
        let mut live = Vec::new();
        let sizes = [100, 4096, 30, 7000, 2048, 1, 12000, 512];

        for step in 0..120usize {
            if step % 4 == 3 && !live.is_empty() {
                let address = live.swap_remove((step * 7) % live.len());
                fx.free(address).unwrap();
            } else {
                live.push(fx.alloc(sizes[step % sizes.len()]).unwrap());
            }
            fx.assert_consistent();
        }

        for address in live {
            fx.free(address).unwrap();
        }
        assert_eq!(fx.pool.used_frames(), 0);
    }
}
