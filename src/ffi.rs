//! C-ABI exports of the process-wide heap.
//!
//! Gated behind `features = ["ffi"]`. All functions share one
//! [`GlobalHeap`], so they are safe to call from several threads.

use crate::global::GlobalHeap;
use core::ptr;

static HEAP: GlobalHeap = GlobalHeap::new();

/// Byte accounting returned by [`blockheap_memory_stats`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockheapStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

#[unsafe(no_mangle)]
pub extern "C" fn blockheap_initialize() {
    HEAP.initialize();
}

#[unsafe(no_mangle)]
pub extern "C" fn blockheap_allocate(size: u64) -> *mut u8 {
    HEAP.allocate(size).map_or(ptr::null_mut(), |p| p.as_ptr())
}

/// # Safety
/// `ptr` must be null or a pointer this heap returned; it must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockheap_free(ptr: *mut u8) {
    unsafe { HEAP.free(ptr) };
}

/// # Safety
/// See [`blockheap_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockheap_reallocate(ptr: *mut u8, new_size: u64) -> *mut u8 {
    unsafe { HEAP.reallocate(ptr, new_size) }.map_or(ptr::null_mut(), |p| p.as_ptr())
}

/// Writes the current accounting to `out`. Does nothing if `out` is null.
///
/// # Safety
/// `out` must be null or valid for writing one `BlockheapStats`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockheap_memory_stats(out: *mut BlockheapStats) {
    if out.is_null() {
        return;
    }
    let stats = HEAP.memory_stats();
    unsafe {
        out.write(BlockheapStats {
            total_bytes: stats.total_bytes,
            used_bytes: stats.used_bytes,
            free_bytes: stats.free_bytes,
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_c_abi() {
        blockheap_initialize();
        let p = blockheap_allocate(64);
        assert!(!p.is_null());
        unsafe {
            p.write_bytes(0x11, 64);
            let q = blockheap_reallocate(p, 512);
            assert!(!q.is_null());
            assert_eq!(*q.add(63), 0x11);

            let mut stats = BlockheapStats::default();
            blockheap_memory_stats(&mut stats);
            assert!(stats.used_bytes >= 512);
            assert!(stats.total_bytes >= stats.used_bytes + stats.free_bytes);

            blockheap_free(q);
            blockheap_free(ptr::null_mut());
            blockheap_memory_stats(ptr::null_mut());
        }
        assert!(blockheap_allocate(0).is_null());
    }
}
