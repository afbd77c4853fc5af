//! Memory management
//!
//! Provides:
//! - Physical frame pools (data and metadata)
//! - Two-level page tables
//! - Per-process address spaces with a region-backed heap
//! - The kernel address space and device mappings
//! - The kernel's own heap allocator
//!
//! # Principles
//! - Physical memory is only touched through a [`PhysMapper`]
//! - Every frame has exactly one owner and is returned exactly once
//! - Exhaustion is an error, never a panic

pub mod address;
mod bitmap;
pub mod frame;
pub mod heap;
pub mod kernel;
mod kheap;
pub mod paging;
pub mod phys;
pub mod space;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE};
pub use frame::FrameAllocator;
pub use heap::{FrameBacking, Heap, RegionBacking};
pub use kernel::KernelSpace;
pub use kheap::{heap_size, heap_used, init_heap};
pub use paging::{Access, PageFlags, PageTable, PageTableEntry};
pub use phys::{Frame, IdentityMapper, PhysMapper};
pub use space::AddressSpace;
