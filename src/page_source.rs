//! Page-granularity backing store.
//!
//! [`PageSource`] is the seam between the block heap and the operating
//! system. [`OsPageSource`] implements it on top of [`crate::platform`] and
//! adds protection changes and instruction cache maintenance for callers that
//! place code in pages they own.

use crate::config::FALLBACK_PAGE_SIZE;
use crate::icache::{InstructionCache, Native};
use crate::platform::{self, Protection};
use crate::heap_trace;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

/// A supplier of page-aligned memory regions.
pub trait PageSource {
    /// Page granularity in bytes. Never zero.
    fn page_size(&self) -> usize;

    /// Obtain `count` contiguous pages, readable and writable (and executable
    /// if requested). Returns `None` if the request cannot be satisfied.
    fn allocate_pages(&self, count: usize, executable: bool) -> Option<NonNull<u8>>;

    /// Release a region obtained from [`PageSource::allocate_pages`].
    /// Returns `false` for a null pointer or if the release failed.
    ///
    /// # Safety
    /// `ptr` and `count` must describe exactly one region previously returned
    /// by this source, and the region must not be used afterwards. Releasing
    /// a region twice is undefined behavior.
    unsafe fn free_pages(&self, ptr: *mut u8, count: usize) -> bool;
}

/// Cached page size; 0 until the first query.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Pages straight from the operating system.
///
/// Zero-sized and stateless, so it can be shared freely between threads and
/// between independent heaps.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsPageSource;

impl OsPageSource {
    pub const fn new() -> Self {
        Self
    }

    /// Byte length of `count` pages, or `None` on overflow or zero.
    fn region_len(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        count.checked_mul(self.page_size())
    }

    /// Change the protection of `size` bytes starting at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be page-aligned and `[ptr, ptr + size)` must lie inside a
    /// region obtained from this source. Revoking access to memory that is
    /// still in use by a heap makes later heap operations fault.
    pub unsafe fn protect_memory(&self, ptr: *mut u8, size: usize, prot: Protection) -> bool {
        if ptr.is_null() || size == 0 {
            return false;
        }
        unsafe { platform::protect_pages(ptr, size, prot) }
    }

    /// # Safety
    /// See [`OsPageSource::protect_memory`].
    pub unsafe fn make_read_only(&self, ptr: *mut u8, size: usize) -> bool {
        unsafe { self.protect_memory(ptr, size, Protection::ReadOnly) }
    }

    /// # Safety
    /// See [`OsPageSource::protect_memory`].
    pub unsafe fn make_inaccessible(&self, ptr: *mut u8, size: usize) -> bool {
        unsafe { self.protect_memory(ptr, size, Protection::NoAccess) }
    }

    /// # Safety
    /// See [`OsPageSource::protect_memory`].
    pub unsafe fn make_writable(&self, ptr: *mut u8, size: usize) -> bool {
        unsafe { self.protect_memory(ptr, size, Protection::ReadWrite) }
    }

    /// Make the range readable and executable (and no longer writable).
    ///
    /// # Safety
    /// See [`OsPageSource::protect_memory`]. Code written into the range must
    /// have been passed through [`OsPageSource::flush_instruction_cache`]
    /// first.
    pub unsafe fn make_executable(&self, ptr: *mut u8, size: usize) -> bool {
        unsafe { self.protect_memory(ptr, size, Protection::ReadExecute) }
    }

    /// Synchronize the instruction cache after writing code bytes. A no-op on
    /// architectures with coherent instruction caches.
    ///
    /// # Safety
    /// `[ptr, ptr + size)` must be mapped and readable.
    pub unsafe fn flush_instruction_cache(&self, ptr: *const u8, size: usize) {
        unsafe { Native.flush(ptr, size) };
    }

    /// Copy `code` to the start of a writable region, flush the instruction
    /// cache and switch the region to read+execute.
    ///
    /// # Safety
    /// `ptr` must be the page-aligned start of a writable region of at least
    /// `region_size` bytes obtained from this source, and `code` must fit.
    pub unsafe fn write_code(&self, ptr: *mut u8, region_size: usize, code: &[u8]) -> bool {
        if ptr.is_null() || code.len() > region_size {
            return false;
        }
        unsafe {
            ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
            self.flush_instruction_cache(ptr, code.len());
            self.make_executable(ptr, region_size)
        }
    }
}

impl PageSource for OsPageSource {
    fn page_size(&self) -> usize {
        let cached = PAGE_SIZE.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let size = match platform::page_size() {
            Some(size) if size.is_power_of_two() => size,
            _ => FALLBACK_PAGE_SIZE,
        };
        PAGE_SIZE.store(size, Ordering::Relaxed);
        size
    }

    fn allocate_pages(&self, count: usize, executable: bool) -> Option<NonNull<u8>> {
        let len = self.region_len(count)?;
        let prot = if executable {
            Protection::ReadWriteExecute
        } else {
            Protection::ReadWrite
        };
        let ptr = unsafe { platform::map_pages(len, prot) };
        heap_trace!("map {} pages ({} bytes) -> {:?}", count, len, ptr);
        NonNull::new(ptr)
    }

    unsafe fn free_pages(&self, ptr: *mut u8, count: usize) -> bool {
        if ptr.is_null() {
            return false;
        }
        let Some(len) = self.region_len(count) else {
            return false;
        };
        heap_trace!("unmap {} pages at {:?}", count, ptr);
        unsafe { platform::unmap_pages(ptr, len) }
    }
}
