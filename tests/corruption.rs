//! Behavior on bad pointers and damaged headers under both policies.

use blockheap::{BlockHeap, CorruptionPolicy, HEADER_SIZE, HeapError, OsPageSource};

fn strict() -> BlockHeap {
    BlockHeap::with_source(OsPageSource::new(), CorruptionPolicy::Strict)
}

fn lenient() -> BlockHeap {
    BlockHeap::with_source(OsPageSource::new(), CorruptionPolicy::Lenient)
}

#[test]
fn lenient_ignores_bad_frees() {
    let mut heap = lenient();
    let a = heap.allocate(48).unwrap();
    let b = heap.allocate(48).unwrap();
    let before = heap.stats();

    let mut local = [0u64; 4];
    unsafe {
        heap.free(local.as_mut_ptr() as *mut u8);
        heap.free(a.as_ptr().add(16));
        heap.free(b.as_ptr());
        heap.free(b.as_ptr());
        assert_eq!(heap.try_free(b.as_ptr()), Ok(()));
    }
    assert_eq!(local, [0; 4]);
    assert_eq!(heap.stats().used_bytes, before.used_bytes - heap_block(48));
    heap.check_integrity().unwrap();
}

#[test]
fn strict_reports_each_kind() {
    let mut heap = strict();
    let a = heap.allocate(48).unwrap();
    let _b = heap.allocate(48).unwrap();
    let mut local = 0u64;
    unsafe {
        assert_eq!(heap.try_free(std::ptr::null_mut()), Ok(()));
        assert_eq!(
            heap.try_free(&mut local as *mut u64 as *mut u8),
            Err(HeapError::InvalidPointer)
        );
        assert_eq!(heap.try_free(a.as_ptr().add(8)), Err(HeapError::InvalidPointer));
        assert_eq!(heap.try_free(a.as_ptr()), Ok(()));
        assert_eq!(heap.try_free(a.as_ptr()), Err(HeapError::DoubleFree));
        assert_eq!(heap.try_reallocate(a.as_ptr(), 100), Err(HeapError::DoubleFree));
    }
    assert_eq!(heap.try_allocate(0), Err(HeapError::ZeroSize));
    heap.check_integrity().unwrap();
}

#[test]
fn damaged_free_header_lenient_uses_fresh_pages() {
    let mut heap = lenient();
    let a = heap.allocate(200).unwrap();
    let _guard = heap.allocate(200).unwrap();
    unsafe { heap.free(a.as_ptr()) };
    let regions = heap.region_count();

    unsafe { a.as_ptr().sub(HEADER_SIZE).write_bytes(0x5A, 8) };

    let b = heap.allocate(100).unwrap();
    assert_eq!(heap.region_count(), regions + 1);
    unsafe { b.as_ptr().write_bytes(0xFF, 100) };
    unsafe { heap.free(b.as_ptr()) };
}

#[test]
fn damaged_free_header_strict_errors() {
    let mut heap = strict();
    let a = heap.allocate(200).unwrap();
    let _guard = heap.allocate(200).unwrap();
    unsafe { heap.free(a.as_ptr()) };
    unsafe { a.as_ptr().sub(HEADER_SIZE).write_bytes(0, HEADER_SIZE) };
    let regions = heap.region_count();

    assert_eq!(heap.try_allocate(100), Err(HeapError::CorruptedFreeList));
    assert_eq!(heap.region_count(), regions);

    // Switching policy lets the heap carry on past the damage.
    heap.set_policy(CorruptionPolicy::Lenient);
    assert!(heap.allocate(100).is_some());
    assert_eq!(heap.region_count(), regions + 1);
}

#[test]
fn damaged_live_header_is_not_freed() {
    let mut heap = strict();
    let a = heap.allocate(64).unwrap();
    let _guard = heap.allocate(64).unwrap();
    unsafe {
        a.as_ptr().sub(HEADER_SIZE).add(8).write_bytes(0, 4);
        assert_eq!(heap.try_free(a.as_ptr()), Err(HeapError::InvalidPointer));
    }
    assert_eq!(heap.usable_size(a.as_ptr()), None);
}

/// Bytes a live block of `size` occupies, header included.
fn heap_block(size: usize) -> u64 {
    (size.max(16).next_multiple_of(8) + HEADER_SIZE) as u64
}
