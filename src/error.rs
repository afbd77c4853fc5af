//! Virtual Memory Errors
//!
//! Every fallible operation in this crate reports one of these. Exhaustion is
//! an expected operating condition and is always returned, never asserted.

/// Error type for frame, page table and heap operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmemError {
    /// The frame pool has no free frames left.
    OutOfPhysicalMemory,
    /// No gap, region tail or new region can hold the heap request.
    OutOfHeapSpace,
    /// The address is not owned by the address space or the frame pool.
    InvalidAddress,
    /// Heap bookkeeping is inconsistent (e.g. a region reference underflow).
    AllocationConsistency,
    /// The process image does not fit in the data table.
    ImageTooLarge,
    /// The kernel directory or the process address space does not exist yet.
    NotInitialized,
}

impl core::fmt::Display for VmemError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfPhysicalMemory => write!(f, "out of physical memory"),
            Self::OutOfHeapSpace => write!(f, "out of heap space"),
            Self::InvalidAddress => write!(f, "invalid address"),
            Self::AllocationConsistency => write!(f, "allocation bookkeeping inconsistent"),
            Self::ImageTooLarge => write!(f, "process image too large"),
            Self::NotInitialized => write!(f, "address space not initialized"),
        }
    }
}

impl core::error::Error for VmemError {}

/// Result alias used throughout the crate.
pub type Result<T, E = VmemError> = core::result::Result<T, E>;
