//! Process Control Block Interface
//!
//! The scheduler owns process control blocks. The virtual memory subsystem
//! only needs to attach an [`AddressSpace`] to one and take it back at exit;
//! the page directory, image size, heap usage and allocation list are all
//! read through the address space.

use crate::mm::AddressSpace;

/// Access to the memory state of a process.
pub trait ProcessControlBlock {
    /// Process identifier, used in log records.
    fn pid(&self) -> u32;

    /// The attached address space, if any.
    fn address_space(&self) -> Option<&AddressSpace>;

    /// The attached address space, mutably.
    fn address_space_mut(&mut self) -> Option<&mut AddressSpace>;

    /// Attach `space`. Only called while none is attached.
    fn set_address_space(&mut self, space: AddressSpace);

    /// Detach and return the address space.
    fn take_address_space(&mut self) -> Option<AddressSpace>;
}
