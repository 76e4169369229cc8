//! Block heap: carves page regions into variably sized blocks.
//!
//! Responsibilities:
//! - Serve allocations first-fit from the free list, splitting large blocks
//! - Grow by requesting whole pages from a [`PageSource`] when nothing fits
//! - Coalesce freed blocks with free physical neighbours
//! - Detect bad pointers and corrupted headers instead of trusting them
//!
//! A `BlockHeap` is single-threaded: every mutating operation takes
//! `&mut self` and the type is `Send` but not `Sync`. Share one between
//! threads through [`crate::GlobalHeap`] (one lock around the whole heap), or
//! give each thread its own heap over the stateless [`OsPageSource`].

use crate::block::{BlockRef, HEADER_SIZE};
use crate::config::{ALIGNMENT, DEFAULT_POLICY, MIN_PAYLOAD, round_up};
use crate::error::HeapError;
use crate::free_list::FreeList;
use crate::page_source::{OsPageSource, PageSource};
use crate::region::{REGION_HEADER_SIZE, RegionList};
use crate::{heap_trace, heap_warn, stat_add, stat_inc};
use core::ptr::{self, NonNull};

/// A remainder is split off only if it is larger than this.
const SPLIT_THRESHOLD: usize = HEADER_SIZE + MIN_PAYLOAD;

/// What the heap does when it finds a bad pointer or a corrupted header.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CorruptionPolicy {
    /// Ignore bad pointers; stop trusting a corrupted free list and fall back
    /// to fresh pages.
    #[default]
    Lenient,
    /// Report every detection as an error from the `try_*` operations.
    Strict,
}

/// Byte accounting for one heap.
///
/// `used_bytes` and `free_bytes` include block headers. The difference
/// between their sum and `total_bytes` is region bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes ever obtained from the page source. Never decreases.
    pub total_bytes: u64,
    /// Bytes in blocks handed out to callers.
    pub used_bytes: u64,
    /// Bytes in blocks available for reuse.
    pub free_bytes: u64,
}

pub struct BlockHeap<S: PageSource = OsPageSource> {
    source: S,
    free_list: FreeList,
    regions: RegionList,
    total_allocated: u64,
    policy: CorruptionPolicy,
}

// SAFETY: the heap exclusively owns every region it links to, and all access
// goes through `&mut self`.
unsafe impl<S: PageSource + Send> Send for BlockHeap<S> {}

impl BlockHeap<OsPageSource> {
    /// A heap over OS pages with the configured default policy.
    pub const fn new() -> Self {
        Self::with_source(OsPageSource::new(), DEFAULT_POLICY)
    }
}

impl Default for BlockHeap<OsPageSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PageSource> BlockHeap<S> {
    pub const fn with_source(source: S, policy: CorruptionPolicy) -> Self {
        Self {
            source,
            free_list: FreeList::new(),
            regions: RegionList::new(),
            total_allocated: 0,
            policy,
        }
    }

    #[inline]
    pub fn policy(&self) -> CorruptionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CorruptionPolicy) {
        self.policy = policy;
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bytes ever obtained from the page source.
    #[inline]
    pub fn total_allocated(&self) -> u64 {
        self.total_allocated
    }

    /// Number of regions obtained from the page source.
    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Number of entries on the free list.
    #[inline]
    pub fn free_block_count(&self) -> usize {
        self.free_list.len()
    }

    /// Allocate at least `size` bytes, 8-byte aligned.
    /// Returns `None` for `size == 0` or when memory cannot be obtained.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size).ok()
    }

    /// Like [`BlockHeap::allocate`], reporting why nothing was returned.
    pub fn try_allocate(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let total = block_size_for(size).ok_or(HeapError::AllocationFailure)?;

        match self.find_fit(total) {
            Ok(Some(block)) => {
                stat_inc!(free_list_hits);
                stat_inc!(alloc_count);
                return Ok(block.data());
            }
            Ok(None) => {}
            Err(err) => {
                stat_inc!(corrupted_walks);
                heap_warn!("free list corrupted, falling back to fresh pages");
                if self.policy == CorruptionPolicy::Strict {
                    return Err(err);
                }
                self.relist();
            }
        }

        let block = self.grow(total)?;
        stat_inc!(alloc_count);
        Ok(block.data())
    }

    /// Return a block to the heap.
    ///
    /// Null, foreign, interior and already-freed pointers are ignored.
    ///
    /// # Safety
    /// If `ptr` was returned by this heap, the caller must not use it after
    /// this call.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let _ = unsafe { self.try_free(ptr) };
    }

    /// Like [`BlockHeap::free`], but under [`CorruptionPolicy::Strict`]
    /// reports rejected pointers. A null pointer is always `Ok`.
    ///
    /// # Safety
    /// See [`BlockHeap::free`].
    pub unsafe fn try_free(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        let Some(data) = NonNull::new(ptr) else {
            return Ok(());
        };
        let Some((region, prev, block)) = self.regions.locate(BlockRef::header_addr(data)) else {
            return self.reject(HeapError::InvalidPointer, ptr);
        };
        if block.is_free() {
            return self.reject(HeapError::DoubleFree, ptr);
        }

        block.set_free(true);
        stat_inc!(free_count);

        // Set when a free neighbour turns out not to be linked where the list
        // expects it; the list is then rebuilt from the regions.
        let mut stale = false;

        if let Some(next) = region.block_at(block.end()) {
            if next.is_free() {
                stale |= !unsafe { self.free_list.remove(next) };
                block.set_size(block.size() + next.size());
                next.retire();
                stat_inc!(block_coalesces);
            }
        }

        if let Some(prev) = prev {
            if prev.is_free() {
                // `prev` keeps its place on the free list and takes over this block.
                stale |= !unsafe { self.free_list.contains(prev) };
                prev.set_size(prev.size() + block.size());
                block.retire();
                stat_inc!(block_coalesces);
                if stale {
                    self.relist();
                }
                return Ok(());
            }
        }

        if stale {
            self.relist();
        } else {
            unsafe { self.push_free(block) };
        }
        Ok(())
    }

    /// Resize a block, moving it if it has to grow.
    ///
    /// - null `ptr` behaves like [`BlockHeap::allocate`]
    /// - `new_size == 0` frees the block and returns `None`
    /// - a size that fits the current block returns `ptr` unchanged
    /// - otherwise the first `min(old capacity, new_size)` bytes are copied
    ///   to a new block and the old one is freed
    ///
    /// On failure the original block is left untouched.
    ///
    /// # Safety
    /// See [`BlockHeap::free`]; on success the old pointer must not be used
    /// unless it was returned again.
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        unsafe { self.try_reallocate(ptr, new_size) }.ok().flatten()
    }

    /// Like [`BlockHeap::reallocate`], reporting why nothing was returned.
    /// `Ok(None)` means the block was freed because `new_size` was zero.
    ///
    /// # Safety
    /// See [`BlockHeap::reallocate`].
    pub unsafe fn try_reallocate(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        let Some(data) = NonNull::new(ptr) else {
            if new_size == 0 {
                return Ok(None);
            }
            return self.try_allocate(new_size).map(Some);
        };
        if new_size == 0 {
            unsafe { self.try_free(ptr)? };
            return Ok(None);
        }

        let Some((_, _, block)) = self.regions.locate(BlockRef::header_addr(data)) else {
            self.reject(HeapError::InvalidPointer, ptr)?;
            return Ok(None);
        };
        if block.is_free() {
            self.reject(HeapError::DoubleFree, ptr)?;
            return Ok(None);
        }

        stat_inc!(realloc_count);
        let capacity = block.capacity();
        if new_size <= capacity {
            stat_inc!(realloc_in_place);
            return Ok(Some(data));
        }

        let new = self.try_allocate(new_size)?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), new.as_ptr(), capacity.min(new_size));
            self.try_free(ptr)?;
        }
        Ok(Some(new))
    }

    /// Bytes the caller may use behind `ptr`, if it is a live block.
    pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
        let data = NonNull::new(ptr as *mut u8)?;
        let (_, _, block) = self.regions.locate(BlockRef::header_addr(data))?;
        if block.is_free() {
            return None;
        }
        Some(block.capacity())
    }

    /// Account for every block in every region.
    pub fn stats(&self) -> MemoryStats {
        let mut stats = MemoryStats {
            total_bytes: self.total_allocated,
            ..MemoryStats::default()
        };
        for region in self.regions.iter() {
            for block in region.blocks() {
                if block.is_free() {
                    stats.free_bytes += block.size() as u64;
                } else {
                    stats.used_bytes += block.size() as u64;
                }
            }
        }
        stats
    }

    /// Verify the structural invariants:
    /// - every region tiles cleanly into valid blocks
    /// - no two free blocks are physically adjacent
    /// - the free list reaches exactly the blocks marked free
    pub fn check_integrity(&self) -> Result<(), HeapError> {
        if self.regions.is_empty() {
            if !self.free_list.is_empty() {
                return Err(HeapError::CorruptedFreeList);
            }
            return Ok(());
        }
        let mut free_blocks = 0usize;
        for region in self.regions.iter() {
            let mut blocks = region.blocks();
            let mut prev_free = false;
            for block in blocks.by_ref() {
                if block.is_free() {
                    if prev_free {
                        return Err(HeapError::CorruptedFreeList);
                    }
                    free_blocks += 1;
                }
                prev_free = block.is_free();
            }
            if blocks.corrupt() {
                return Err(HeapError::CorruptedFreeList);
            }
        }

        let mut listed = 0usize;
        let mut cursor = self.free_list.head_raw();
        while !cursor.is_null() {
            let block = self
                .regions
                .block_at(cursor as usize)
                .ok_or(HeapError::CorruptedFreeList)?;
            if !block.is_free() || listed >= free_blocks {
                return Err(HeapError::CorruptedFreeList);
            }
            listed += 1;
            cursor = block.next_raw();
        }
        if listed != free_blocks || listed != self.free_list.len() {
            return Err(HeapError::CorruptedFreeList);
        }
        Ok(())
    }

    /// First fit from the head of the free list. Stops at the first node that
    /// fails validation rather than skipping past it.
    fn find_fit(&mut self, total: usize) -> Result<Option<BlockRef>, HeapError> {
        let mut cursor = self.free_list.head_raw();
        let mut visited = 0usize;
        while !cursor.is_null() {
            // More nodes than entries means the links loop.
            if visited >= self.free_list.len() {
                return Err(HeapError::CorruptedFreeList);
            }
            let Some(block) = self.regions.block_at(cursor as usize) else {
                return Err(HeapError::CorruptedFreeList);
            };
            if block.is_free() && block.size() >= total {
                unsafe { self.take(block, total) };
                return Ok(Some(block));
            }
            visited += 1;
            cursor = block.next_raw();
        }
        Ok(None)
    }

    /// Claim `block` from the free list, splitting off the tail if the
    /// remainder is worth keeping.
    ///
    /// # Safety
    /// `block` must be a validated free block on the free list with
    /// `size >= total`.
    unsafe fn take(&mut self, block: BlockRef, total: usize) {
        let remainder = block.size() - total;
        if remainder > SPLIT_THRESHOLD {
            heap_trace!("split {:#x}: {} -> {} + {}", block.addr(), block.size(), total, remainder);
            let tail_addr = unsafe { block.data().add(total - HEADER_SIZE) };
            let tail = unsafe { BlockRef::init(tail_addr, remainder, true) };
            block.set_size(total);
            unsafe { self.free_list.replace(block, tail) };
            stat_inc!(block_splits);
        } else {
            let removed = unsafe { self.free_list.remove(block) };
            debug_assert!(removed, "fit found by walking the list is on the list");
        }
        block.set_free(false);
    }

    /// Map a new region big enough for a block of `total` bytes and return
    /// that block, used. Leftover space becomes a free block at the head of
    /// the free list.
    fn grow(&mut self, total: usize) -> Result<BlockRef, HeapError> {
        let page_size = self.source.page_size();
        let pages = total
            .checked_add(REGION_HEADER_SIZE)
            .ok_or(HeapError::AllocationFailure)?
            .div_ceil(page_size);
        let len = pages
            .checked_mul(page_size)
            .ok_or(HeapError::AllocationFailure)?;

        let Some(base) = self.source.allocate_pages(pages, false) else {
            heap_warn!("page source declined {} pages", pages);
            return Err(HeapError::AllocationFailure);
        };
        self.total_allocated += len as u64;
        stat_inc!(os_alloc_count);
        stat_add!(os_alloc_bytes, len);
        heap_trace!("grow: {} pages at {:?} for a {} byte block", pages, base, total);

        let region = unsafe { self.regions.push(base, pages, len) };
        let leftover = region.usable() - total;
        let split = leftover > SPLIT_THRESHOLD;
        let used_size = if split { total } else { region.usable() };

        // Both headers go in before the tail is listed, so the region already
        // tiles cleanly if listing it triggers a rebuild.
        let head_addr = unsafe { base.add(REGION_HEADER_SIZE) };
        debug_assert_eq!(head_addr.as_ptr() as usize, region.first_block_addr());
        let block = unsafe { BlockRef::init(head_addr, used_size, false) };
        if split {
            let tail_addr = unsafe { base.add(REGION_HEADER_SIZE + total) };
            let tail = unsafe { BlockRef::init(tail_addr, leftover, true) };
            unsafe { self.push_free(tail) };
        }
        Ok(block)
    }

    /// Put a free block at the head of the list, or rebuild the list if its
    /// current head no longer validates.
    ///
    /// # Safety
    /// `block` must be a valid free block in one of this heap's regions and
    /// not on the list.
    unsafe fn push_free(&mut self, block: BlockRef) {
        let head = self.free_list.head_raw();
        if !head.is_null() && self.regions.block_at(head as usize).is_none() {
            stat_inc!(corrupted_walks);
            heap_warn!("free list head {:?} failed validation", head);
            // `block` is already flagged free, so the rebuild picks it up.
            self.relist();
            return;
        }
        unsafe { self.free_list.push(block) };
    }

    /// Rebuild the free list from a walk of every region, listing each block
    /// flagged free. A region walk stops at the first damaged header, so
    /// blocks behind it stay out of circulation.
    fn relist(&mut self) {
        heap_trace!("rebuilding free list from {} regions", self.regions.len());
        self.free_list.clear();
        for region in self.regions.iter() {
            for block in region.blocks() {
                if block.is_free() {
                    unsafe { self.free_list.push(block) };
                }
            }
        }
    }

    fn reject(&self, err: HeapError, ptr: *mut u8) -> Result<(), HeapError> {
        stat_inc!(invalid_frees);
        heap_warn!("rejected pointer {:?}: {}", ptr, err);
        match self.policy {
            CorruptionPolicy::Lenient => Ok(()),
            CorruptionPolicy::Strict => Err(err),
        }
    }
}

impl<S: PageSource> Drop for BlockHeap<S> {
    /// Teardown: hand every region back to the page source. Pointers still
    /// held by callers dangle afterwards.
    fn drop(&mut self) {
        self.free_list.clear();
        while let Some(region) = self.regions.pop() {
            let pages = region.pages();
            let ok = unsafe { self.source.free_pages(region.base().as_ptr(), pages) };
            if !ok {
                heap_warn!("failed to release {} pages at {:?}", pages, region.base());
            }
        }
    }
}

/// Block size (header included) for a request of `size` bytes.
fn block_size_for(size: usize) -> Option<usize> {
    let payload = size.max(MIN_PAYLOAD);
    if payload > usize::MAX - HEADER_SIZE - ALIGNMENT {
        return None;
    }
    Some(round_up(payload, ALIGNMENT) + HEADER_SIZE)
}
