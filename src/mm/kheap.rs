//! Kernel Heap Allocator
//!
//! Uses `linked_list_allocator` for the kernel's own bookkeeping: the
//! allocation and region arenas of every address space live here.
//!
//! # Memory Layout
//! The heap is a static arena inside the kernel image, covered by the low
//! identity mapping.
//!
//! # Properties
//! - On the bare-metal target this is the global allocator
//! - Initialization happens once; later calls are no-ops

use linked_list_allocator::LockedHeap;
use log::info;
use spin::Once;

/// Kernel heap instance.
#[cfg_attr(target_os = "none", global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Size of the kernel heap arena (256 KiB).
const HEAP_SIZE: usize = 256 * 1024;

/// Backing memory for the kernel heap.
static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

static INIT: Once = Once::new();

/// Initialize the kernel heap.
///
/// Must run before the first allocation. Repeated calls do nothing.
pub fn init_heap() {
    INIT.call_once(|| {
        // SAFETY: HEAP_MEMORY is only reached through this pointer, and the
        // Once guard hands it to the allocator a single time.
        unsafe {
            let heap_start = (&raw mut HEAP_MEMORY).cast::<u8>();
            ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
        }
        info!("[kheap] {} KiB kernel heap ready", HEAP_SIZE / 1024);
    });
}

/// Capacity of the kernel heap in bytes.
pub fn heap_size() -> usize {
    HEAP_SIZE
}

/// Bytes currently allocated from the kernel heap.
pub fn heap_used() -> usize {
    ALLOCATOR.lock().used()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::alloc::Layout;

    #[test]
    fn test_init_once_and_allocate() {
        init_heap();
        init_heap();
        assert_eq!(ALLOCATOR.lock().size(), heap_size());

        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = ALLOCATOR.lock().allocate_first_fit(layout).unwrap();
        assert!(heap_used() >= 128);

        // SAFETY: ptr was just allocated from this heap with `layout`.
        unsafe { ALLOCATOR.lock().deallocate(ptr, layout) };
        assert_eq!(heap_used(), 0);
    }
}
