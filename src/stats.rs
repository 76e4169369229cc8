//! Operation counters.
//!
//! All counters use `Relaxed` ordering; they are observational only and not
//! used as synchronization primitives. They are shared by every heap in the
//! process and only updated when the `stats` feature is enabled; without it
//! [`snapshot()`] returns zeros.
//!
//! These are event counts. Byte accounting for a single heap comes from
//! [`crate::BlockHeap::stats`].
//!
//! # Usage
//!
//! ```ignore
//! let snap = blockheap::stats::snapshot();
//! println!("allocs: {}", snap.alloc_count);
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Successful allocations (including those made by reallocate).
    pub alloc_count: AtomicU64,
    /// Blocks returned to a free list.
    pub free_count: AtomicU64,
    /// Calls to reallocate that needed a decision (non-null, non-zero).
    pub realloc_count: AtomicU64,
    /// Reallocations satisfied in place.
    pub realloc_in_place: AtomicU64,
    /// Allocations served from the free list.
    pub free_list_hits: AtomicU64,
    /// Regions requested from a page source.
    pub os_alloc_count: AtomicU64,
    /// Bytes requested from a page source.
    pub os_alloc_bytes: AtomicU64,
    /// Free blocks split to satisfy a smaller request.
    pub block_splits: AtomicU64,
    /// Adjacent free blocks merged.
    pub block_coalesces: AtomicU64,
    /// Pointers rejected by free/reallocate, including double frees.
    pub invalid_frees: AtomicU64,
    /// Free list walks aborted on a bad header.
    pub corrupted_walks: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            free_count: AtomicU64::new(0),
            realloc_count: AtomicU64::new(0),
            realloc_in_place: AtomicU64::new(0),
            free_list_hits: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            block_splits: AtomicU64::new(0),
            block_coalesces: AtomicU64::new(0),
            invalid_frees: AtomicU64::new(0),
            corrupted_walks: AtomicU64::new(0),
        }
    }
}

#[cfg_attr(not(feature = "stats"), allow(dead_code))]
pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of the operation counters.
///
/// Individual fields are each atomically read, but the snapshot as a whole
/// is not globally consistent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub free_count: u64,
    pub realloc_count: u64,
    pub realloc_in_place: u64,
    pub free_list_hits: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
    pub block_splits: u64,
    pub block_coalesces: u64,
    pub invalid_frees: u64,
    pub corrupted_walks: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        free_count: s.free_count.load(Ordering::Relaxed),
        realloc_count: s.realloc_count.load(Ordering::Relaxed),
        realloc_in_place: s.realloc_in_place.load(Ordering::Relaxed),
        free_list_hits: s.free_list_hits.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        block_splits: s.block_splits.load(Ordering::Relaxed),
        block_coalesces: s.block_coalesces.load(Ordering::Relaxed),
        invalid_frees: s.invalid_frees.load(Ordering::Relaxed),
        corrupted_walks: s.corrupted_walks.load(Ordering::Relaxed),
    }
}
