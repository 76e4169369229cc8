//! Miri-compatible platform shim using std::alloc as backing store.
//!
//! Miri can't execute real OS syscalls (mmap/VirtualAlloc), so we use the
//! system allocator to provide page-aligned memory. Protection changes are
//! accepted and ignored.

extern crate alloc;

use super::Protection;
use core::alloc::Layout;

const MIRI_PAGE_SIZE: usize = 4096;

pub fn page_size() -> Option<usize> {
    Some(MIRI_PAGE_SIZE)
}

pub unsafe fn map_pages(size: usize, _prot: Protection) -> *mut u8 {
    match Layout::from_size_align(size, MIRI_PAGE_SIZE) {
        Ok(layout) => unsafe { alloc::alloc::alloc_zeroed(layout) },
        Err(_) => core::ptr::null_mut(),
    }
}

pub unsafe fn unmap_pages(ptr: *mut u8, size: usize) -> bool {
    match Layout::from_size_align(size, MIRI_PAGE_SIZE) {
        Ok(layout) => {
            unsafe { alloc::alloc::dealloc(ptr, layout) };
            true
        }
        Err(_) => false,
    }
}

pub unsafe fn protect_pages(_ptr: *mut u8, _size: usize, _prot: Protection) -> bool {
    true
}
