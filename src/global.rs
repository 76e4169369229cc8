//! Process-wide entry point: one lazily built heap behind one lock.
//!
//! `GlobalHeap` is an explicit handle, not hidden state. Put it in a
//! `static` to get a process-wide allocator, or create as many as needed.
//! The heap inside is built on first use (or by [`GlobalHeap::initialize`])
//! and lives until [`GlobalHeap::teardown`].
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: blockheap::GlobalHeap = blockheap::GlobalHeap::new();
//! ```
//!
//! Every call takes the same spin lock for its whole duration, so throughput
//! does not scale with threads. Alignments above 8 are not supported.

use crate::config::{ALIGNMENT, DEFAULT_POLICY};
use crate::heap::{BlockHeap, CorruptionPolicy, MemoryStats};
use crate::heap_trace;
use crate::page_source::OsPageSource;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use spin::Mutex;

pub struct GlobalHeap {
    inner: Mutex<Option<BlockHeap>>,
    policy: CorruptionPolicy,
}

impl Default for GlobalHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalHeap {
    /// An uninitialized handle using the configured default policy.
    pub const fn new() -> Self {
        Self::with_policy(DEFAULT_POLICY)
    }

    pub const fn with_policy(policy: CorruptionPolicy) -> Self {
        Self {
            inner: Mutex::new(None),
            policy,
        }
    }

    /// Build the heap if it does not exist yet. Idempotent.
    pub fn initialize(&self) {
        self.with_heap(|_| ());
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Run `f` with exclusive access to the heap, building it first if
    /// needed.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut BlockHeap) -> R) -> R {
        let mut guard = self.inner.lock();
        let heap = guard.get_or_insert_with(|| {
            heap_trace!("initializing global heap");
            BlockHeap::with_source(OsPageSource::new(), self.policy)
        });
        f(heap)
    }

    /// Allocate `size` bytes. `None` for zero, for sizes that do not fit the
    /// address space, and when the OS refuses pages.
    pub fn allocate(&self, size: u64) -> Option<NonNull<u8>> {
        let size = usize::try_from(size).ok()?;
        self.with_heap(|heap| heap.allocate(size))
    }

    /// Free a block. A no-op before initialization.
    ///
    /// # Safety
    /// See [`BlockHeap::free`].
    pub unsafe fn free(&self, ptr: *mut u8) {
        if let Some(heap) = self.inner.lock().as_mut() {
            unsafe { heap.free(ptr) };
        }
    }

    /// Resize a block. See [`BlockHeap::reallocate`].
    ///
    /// # Safety
    /// See [`BlockHeap::reallocate`].
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: u64) -> Option<NonNull<u8>> {
        let new_size = usize::try_from(new_size).ok()?;
        self.with_heap(|heap| unsafe { heap.reallocate(ptr, new_size) })
    }

    /// Byte accounting; all zero before initialization.
    pub fn memory_stats(&self) -> MemoryStats {
        self.inner
            .lock()
            .as_ref()
            .map(BlockHeap::stats)
            .unwrap_or_default()
    }

    /// Drop the heap and release all of its pages. The next call builds a
    /// fresh heap.
    ///
    /// # Safety
    /// Every pointer handed out so far dangles afterwards. Must not be used on
    /// a handle registered as `#[global_allocator]` while anything it
    /// allocated is alive.
    pub unsafe fn teardown(&self) {
        let heap = self.inner.lock().take();
        drop(heap);
    }
}

unsafe impl GlobalAlloc for GlobalHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        self.with_heap(|heap| heap.allocate(layout.size()))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.free(ptr) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        self.with_heap(|heap| unsafe { heap.reallocate(ptr, new_size) })
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
