//! Memory Layout and Runtime Configuration
//!
//! # Physical layout
//! - `0x0000_0000..0x01C0_0000`: identity-mapped into every address space
//! - `0x0020_0000..0x0030_0000`: metadata pool (directories and tables)
//! - `0x0040_0000..0x0160_0000`: data pool (process images, stacks, heaps)
//!
//! # Process virtual layout
//! - `DATA_BASE`: process image, one page per 4 KiB of image
//! - `HEAP_BASE`: heap regions, one page table of span
//! - `STACK_TOP`: two pages growing down

use core::ops::Range;

use crate::mm::address::{PhysAddr, VirtAddr, PAGE_SIZE, TABLE_SPAN};

/// Start of the metadata pool.
pub const METADATA_POOL_START: u32 = 0x0020_0000;
/// End of the metadata pool.
pub const METADATA_POOL_END: u32 = 0x0030_0000;

/// Start of the data pool.
pub const DATA_POOL_START: u32 = 0x0040_0000;
/// End of the data pool.
pub const DATA_POOL_END: u32 = 0x0160_0000;

/// Physical memory identity-mapped by the kernel directory (28 MiB).
pub const IDENTITY_MAP_END: u32 = 0x01C0_0000;

/// Virtual base of the process image.
pub const DATA_BASE: VirtAddr = VirtAddr::new(0x0100_0000);
/// Virtual base of the heap, both for processes and kernel threads.
pub const HEAP_BASE: VirtAddr = VirtAddr::new(0xE000_0000);
/// Highest heap address plus one (one page table of span).
pub const HEAP_END: VirtAddr = VirtAddr::new(0xE000_0000 + TABLE_SPAN as u32);
/// Initial stack pointer of a process.
pub const STACK_TOP: VirtAddr = VirtAddr::new(0xEFFF_FFF0);
/// Pages mapped for a fresh process stack.
pub const STACK_PAGES: usize = 2;

/// Largest process image the data table can hold.
pub const MAX_IMAGE_SIZE: usize = TABLE_SPAN;

/// Runtime configuration for the virtual memory subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmemConfig {
    /// Physical range handed out for page contents.
    pub data_pool: Range<PhysAddr>,
    /// Physical range handed out for directories and page tables.
    pub metadata_pool: Range<PhysAddr>,
    /// End of the low identity mapping built by kernel init.
    pub identity_map_end: PhysAddr,
}

impl Default for VmemConfig {
    fn default() -> Self {
        Self {
            data_pool: PhysAddr::new(DATA_POOL_START)..PhysAddr::new(DATA_POOL_END),
            metadata_pool: PhysAddr::new(METADATA_POOL_START)..PhysAddr::new(METADATA_POOL_END),
            identity_map_end: PhysAddr::new(IDENTITY_MAP_END),
        }
    }
}

/// Display mode reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    /// Physical address of the linear framebuffer.
    pub framebuffer: PhysAddr,
    /// Horizontal resolution in pixels.
    pub width: u32,
    /// Vertical resolution in pixels.
    pub height: u32,
    /// Bits per pixel.
    pub bpp: u32,
}

impl VideoMode {
    /// Bytes to identity-map for the framebuffer.
    ///
    /// One byte past the pixel data is included so a trailing partial page
    /// is always covered.
    pub const fn mapped_size(&self) -> usize {
        (self.width as usize) * (self.height as usize) * (self.bpp as usize / 8) + 1
    }

    /// Number of pages the framebuffer mapping spans.
    pub const fn pages(&self) -> usize {
        self.mapped_size().div_ceil(PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = VmemConfig::default();
        assert!(config.metadata_pool.end <= config.data_pool.start);
        assert_eq!(config.identity_map_end.as_usize(), 7 * TABLE_SPAN);
        assert_eq!(HEAP_END.directory_index(), HEAP_BASE.directory_index() + 1);
    }

    #[test]
    fn test_video_pages() {
        let mode = VideoMode {
            framebuffer: PhysAddr::new(0xFD00_0000),
            width: 640,
            height: 480,
            bpp: 32,
        };
        assert_eq!(mode.mapped_size(), 640 * 480 * 4 + 1);
        assert_eq!(mode.pages(), 301);
    }
}
