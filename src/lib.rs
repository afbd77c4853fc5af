//! kvmem - Virtual Memory Core for a 32-bit Single-Core Kernel
//!
//! Manages physical frames, two-level page tables and per-process address
//! spaces for a small x86-style kernel.
//!
//! # Components
//! - Frame pools: a data pool for page contents and a metadata pool for
//!   directories and tables, each a locked bitmap
//! - Paging: directory and table entries with supervisor or user access
//! - Address spaces: image, stack and a region-backed heap per process
//! - Kernel space: identity map, kernel heap table, framebuffer and devices
//!
//! # Entry point
//! Everything is reached through [`Vmem`], which owns both pools and the
//! kernel directory.
//!
//! # Targets
//! The crate is `no_std` on the kernel target. Unit tests run on the host
//! against simulated physical memory.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod logger;
pub mod mm;
pub mod process;
pub mod vmem;

pub use config::{VideoMode, VmemConfig};
pub use error::{Result, VmemError};
pub use mm::{AddressSpace, FrameAllocator, IdentityMapper, PhysAddr, PhysMapper, VirtAddr};
pub use process::ProcessControlBlock;
pub use vmem::Vmem;
