//! OS platform abstraction for virtual memory.
//!
//! Provides page mapping, unmapping and protection changes on top of the
//! platform-specific virtual memory APIs (VirtualAlloc on Windows, mmap on
//! Unix). Under Miri, uses std::alloc as a backing store instead.

cfg_if::cfg_if! {
    if #[cfg(miri)] {
        mod miri;
        use miri as os;
    } else if #[cfg(windows)] {
        mod windows;
        use windows as os;
    } else if #[cfg(unix)] {
        mod unix;
        use unix as os;
    } else {
        compile_error!("blockheap supports unix and windows targets only");
    }
}

/// Access mode of a mapped page range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Protection {
    /// Any access faults.
    NoAccess,
    ReadOnly,
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
}

/// Query the OS page size. `None` if the query is unavailable or failed.
#[inline]
pub fn page_size() -> Option<usize> {
    os::page_size()
}

/// Map `size` bytes of fresh, private, anonymous memory with protection `prot`.
/// Returns null on failure. Memory is zero-initialized by the OS.
///
/// # Safety
/// `size` must be a non-zero multiple of the page size. The caller owns the
/// mapping and must release it with `unmap_pages` using the same `size`.
#[inline]
pub unsafe fn map_pages(size: usize, prot: Protection) -> *mut u8 {
    unsafe { os::map_pages(size, prot) }
}

/// Release a mapping previously created by `map_pages`.
///
/// # Safety
/// `ptr` must have been returned by `map_pages` with the same `size`, and
/// must not be used afterwards.
#[inline]
pub unsafe fn unmap_pages(ptr: *mut u8, size: usize) -> bool {
    unsafe { os::unmap_pages(ptr, size) }
}

/// Change the protection of `size` bytes starting at `ptr`.
///
/// # Safety
/// `ptr` must be page-aligned and the range must lie inside a live mapping.
#[inline]
pub unsafe fn protect_pages(ptr: *mut u8, size: usize, prot: Protection) -> bool {
    unsafe { os::protect_pages(ptr, size, prot) }
}
