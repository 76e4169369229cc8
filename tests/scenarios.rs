//! End-to-end behavior of a single heap over OS pages.

use blockheap::{BlockHeap, HEADER_SIZE, PageSource};
use std::ptr::NonNull;

fn fill_index(ptr: NonNull<u8>, range: std::ops::Range<usize>) {
    for i in range {
        unsafe { *ptr.as_ptr().add(i) = (i % 256) as u8 };
    }
}

fn check_index(ptr: NonNull<u8>, range: std::ops::Range<usize>) -> bool {
    range.into_iter().all(|i| unsafe { *ptr.as_ptr().add(i) } == (i % 256) as u8)
}

#[test]
fn write_read_1024() {
    let mut heap = BlockHeap::new();
    let p = heap.allocate(1024).unwrap();
    fill_index(p, 0..1024);
    assert!(check_index(p, 0..1024));
    unsafe { heap.free(p.as_ptr()) };
    assert_eq!(heap.stats().used_bytes, 0);
}

#[test]
fn realloc_grow_then_shrink_keeps_prefix() {
    let mut heap = BlockHeap::new();
    let p = heap.allocate(128).unwrap();
    fill_index(p, 0..128);

    let grown = unsafe { heap.reallocate(p.as_ptr(), 256) }.unwrap();
    assert!(check_index(grown, 0..128));
    fill_index(grown, 128..256);
    assert!(check_index(grown, 0..256));

    let shrunk = unsafe { heap.reallocate(grown.as_ptr(), 64) }.unwrap();
    assert_eq!(shrunk, grown);
    assert!(check_index(shrunk, 0..64));

    unsafe { heap.free(shrunk.as_ptr()) };
    heap.check_integrity().unwrap();
}

#[test]
fn hundred_growing_allocations() {
    let mut heap = BlockHeap::new();
    let mut live = Vec::new();
    for i in 0..100usize {
        let size = 100 * (i + 1);
        let p = heap.allocate(size).unwrap();
        for j in 0..size {
            unsafe { *p.as_ptr().add(j) = (i ^ j) as u8 };
        }
        live.push((p, size, i));
    }
    for &(p, size, i) in &live {
        for j in 0..size {
            assert_eq!(unsafe { *p.as_ptr().add(j) }, (i ^ j) as u8, "block {i} byte {j}");
        }
    }
    for (p, _, _) in live {
        unsafe { heap.free(p.as_ptr()) };
    }
    heap.check_integrity().unwrap();
    assert_eq!(heap.stats().used_bytes, 0);
}

#[test]
fn alignment_and_disjointness() {
    let mut heap = BlockHeap::new();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for i in 0..300usize {
        let size = 1 + (i * 53) % 900;
        let p = heap.allocate(size).unwrap().as_ptr() as usize;
        assert_eq!(p % 8, 0, "size {size}");
        ranges.push((p, p + size));
    }
    ranges.sort_unstable();
    for w in ranges.windows(2) {
        // Payloads never overlap, and a header always sits between them.
        assert!(w[0].1 + HEADER_SIZE <= w[1].0);
    }
}

#[test]
fn stats_accounting_balances() {
    let mut heap = BlockHeap::new();
    let mut live = Vec::new();
    for i in 0..64usize {
        live.push(heap.allocate(24 + i * 40).unwrap());
    }
    for p in live.iter().step_by(3) {
        unsafe { heap.free(p.as_ptr()) };
    }
    let stats = heap.stats();
    let bookkeeping = (heap.region_count() * 32) as u64;
    assert_eq!(stats.used_bytes + stats.free_bytes + bookkeeping, stats.total_bytes);
    assert_eq!(stats.total_bytes % heap.source().page_size() as u64, 0);
    heap.check_integrity().unwrap();
}

#[test]
fn large_allocation_gets_own_region() {
    let mut heap = BlockHeap::new();
    let page = heap.source().page_size();
    let _small = heap.allocate(64).unwrap();
    let before = heap.stats().total_bytes;

    let big = heap.allocate(page * 5).unwrap();
    let added = heap.stats().total_bytes - before;
    // ceil((payload + header + region record) / page) pages.
    let expected = (page * 5 + HEADER_SIZE + 32).div_ceil(page) * page;
    assert_eq!(added, expected as u64);

    unsafe { big.as_ptr().write_bytes(0xA5, page * 5) };
    unsafe { heap.free(big.as_ptr()) };
    heap.check_integrity().unwrap();
}

#[test]
fn churn_keeps_heap_consistent() {
    let mut heap = BlockHeap::new();
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    let mut state = 0x2545_F491_u64;
    for _ in 0..5000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        if live.len() < 64 && (state & 3 != 0 || live.is_empty()) {
            let size = 1 + (state >> 8) as usize % 2000;
            let p = heap.allocate(size).unwrap();
            unsafe { p.as_ptr().write_bytes(size as u8, size) };
            live.push((p, size));
        } else {
            let (p, size) = live.swap_remove((state >> 16) as usize % live.len());
            for j in 0..size {
                assert_eq!(unsafe { *p.as_ptr().add(j) }, size as u8);
            }
            unsafe { heap.free(p.as_ptr()) };
        }
    }
    heap.check_integrity().unwrap();
    for (p, _) in live {
        unsafe { heap.free(p.as_ptr()) };
    }
    heap.check_integrity().unwrap();
    assert_eq!(heap.free_block_count(), heap.region_count());
}
