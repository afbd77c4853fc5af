//! Physical Frame Allocator
//!
//! Manages a pool of physical memory pages (frames) using a bitmap.
//!
//! # Design
//! - Each bit in the bitmap represents one 4KB frame of `[start, end)`
//! - Bit = 0: frame is free
//! - Bit = 1: frame is allocated
//! - Two pools exist: one for page contents, one for directories and tables,
//!   so page-table metadata never competes with data for frames
//!
//! # Properties
//! - Exhaustion is reported as [`VmemError::OutOfPhysicalMemory`]
//! - Frees outside the pool or of a free frame are rejected
//! - The bitmap is protected by a spinlock held only for the bit update

use core::ops::Range;

use log::{debug, warn};
use spin::Mutex;

use super::address::{PhysAddr, PAGE_SHIFT, PAGE_SIZE};
use super::bitmap::Bitmap;
use super::phys::PhysMapper;
use crate::error::{Result, VmemError};

/// Frame allocator state guarded by the pool lock.
struct FrameAllocatorInner {
    /// Bitmap tracking allocated frames.
    bitmap: Bitmap,
    /// Number of frames handed out.
    used: usize,
}

/// A pool of physical frames.
pub struct FrameAllocator {
    name: &'static str,
    start: PhysAddr,
    end: PhysAddr,
    total: usize,
    inner: Mutex<FrameAllocatorInner>,
}

impl FrameAllocator {
    /// Create a pool managing the frames of `range`.
    ///
    /// `range.start` is rounded down and `range.end` is truncated to whole
    /// frames.
    pub fn new(name: &'static str, range: Range<PhysAddr>) -> Self {
        let start = range.start.align_down();
        let end = range.end.align_down().max(start);
        let total = (end.as_usize() - start.as_usize()) >> PAGE_SHIFT;

        debug!("[{name} pool] {total} frames at {start}..{end}");

        Self {
            name,
            start,
            end,
            total,
            inner: Mutex::new(FrameAllocatorInner {
                bitmap: Bitmap::new(total),
                used: 0,
            }),
        }
    }

    /// Allocate a single frame.
    pub fn allocate(&self) -> Result<PhysAddr> {
        let bit = {
            let mut inner = self.inner.lock();
            let Some(bit) = inner.bitmap.find_first_free() else {
                drop(inner);
                warn!("[{} pool] out of frames ({} in use)", self.name, self.total);
                return Err(VmemError::OutOfPhysicalMemory);
            };
            inner.bitmap.set(bit);
            inner.used += 1;
            bit
        };

        let addr = self.start.add(bit * PAGE_SIZE);
        debug!("[{} pool] allocated frame {bit} at {addr}", self.name);
        Ok(addr)
    }

    /// Allocate a single frame and zero it through `mapper`.
    pub fn allocate_zeroed<M: PhysMapper>(&self, mapper: &mut M) -> Result<PhysAddr> {
        let addr = self.allocate()?;
        mapper.zero_frame(addr);
        Ok(addr)
    }

    /// Return a frame to the pool.
    ///
    /// Addresses outside the pool and frames that are not allocated are
    /// rejected with [`VmemError::InvalidAddress`].
    pub fn free(&self, addr: PhysAddr) -> Result<()> {
        if !self.contains(addr) {
            warn!("[{} pool] rejected free of {addr}: outside pool", self.name);
            return Err(VmemError::InvalidAddress);
        }

        let bit = (addr.as_usize() - self.start.as_usize()) >> PAGE_SHIFT;
        let mut inner = self.inner.lock();
        if !inner.bitmap.is_set(bit) {
            drop(inner);
            warn!("[{} pool] rejected free of {addr}: not allocated", self.name);
            return Err(VmemError::InvalidAddress);
        }
        inner.bitmap.clear(bit);
        inner.used -= 1;
        Ok(())
    }

    /// Whether `addr` lies inside this pool.
    #[inline]
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Name used in log records.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First address of the pool.
    #[inline]
    pub fn start(&self) -> PhysAddr {
        self.start
    }

    /// End of the pool (exclusive).
    #[inline]
    pub fn end(&self) -> PhysAddr {
        self.end
    }

    /// Number of frames under management.
    #[inline]
    pub fn total_frames(&self) -> usize {
        self.total
    }

    /// Number of frames currently allocated.
    pub fn used_frames(&self) -> usize {
        self.inner.lock().used
    }

    /// Number of frames still available.
    pub fn free_frames(&self) -> usize {
        self.total - self.used_frames()
    }
}

impl core::fmt::Debug for FrameAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameAllocator")
            .field("name", &self.name)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("total", &self.total)
            .field("used", &self.used_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::vec::Vec;

    use super::*;
    use crate::mm::phys::SparseMemory;

    const BASE: u32 = 0x0040_0000;

    fn pool(frames: u32) -> FrameAllocator {
        FrameAllocator::new(
            "test",
            PhysAddr::new(BASE)..PhysAddr::new(BASE + frames * PAGE_SIZE as u32),
        )
    }

    #[test]
    fn test_four_frame_pool() {
        let pool = pool(4);
        for i in 0..4 {
            let addr = pool.allocate().unwrap();
            assert_eq!(addr, PhysAddr::new(BASE + i * 4096));
        }
        assert_eq!(pool.allocate(), Err(VmemError::OutOfPhysicalMemory));
        assert_eq!(pool.used_frames(), 4);
    }

    #[test]
    fn test_free_reuses_lowest_frame() {
        let pool = pool(4);
        let frames: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();

        pool.free(frames[1]).unwrap();
        assert_eq!(pool.used_frames(), 3);
        assert_eq!(pool.allocate().unwrap(), frames[1]);
    }

    #[test]
    fn test_rejects_foreign_and_double_free() {
        let pool = pool(2);
        let addr = pool.allocate().unwrap();

        assert_eq!(pool.free(PhysAddr::new(0x0010_0000)), Err(VmemError::InvalidAddress));
        assert_eq!(pool.free(pool.end()), Err(VmemError::InvalidAddress));

        pool.free(addr).unwrap();
        assert_eq!(pool.free(addr), Err(VmemError::InvalidAddress));
        assert_eq!(pool.used_frames(), 0);
    }

    #[test]
    fn test_used_count_tracks_outstanding() {
        let pool = pool(16);
        let mut live = Vec::new();
        let mut seen = HashSet::new();

        // Deterministic interleaving of allocations and frees.
        for step in 0..64usize {
            if step % 3 == 2 && !live.is_empty() {
                let addr = live.remove(step % live.len());
                pool.free(addr).unwrap();
                seen.remove(&addr);
            } else if let Ok(addr) = pool.allocate() {
                assert!(seen.insert(addr), "frame handed out twice");
                live.push(addr);
            }
            assert_eq!(pool.used_frames(), live.len());
        }
    }

    #[test]
    fn test_allocate_zeroed() {
        let pool = pool(1);
        let mut mem = SparseMemory::new();
        mem.frame_mut(PhysAddr::new(BASE)).0.fill(0x5A);

        let addr = pool.allocate_zeroed(&mut mem).unwrap();
        assert!(mem.frame(addr).0.iter().all(|&b| b == 0));
    }
}
