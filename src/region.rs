//! Page regions owned by a heap.
//!
//! Each region obtained from a page source starts with a [`RegionHeader`]
//! that links it into the heap's [`RegionList`]. Blocks tile the rest of the
//! region back to back, so walking a region from its first block visits every
//! block in address order. The region list answers two questions the block
//! headers alone cannot: whether an address belongs to this heap at all, and
//! which block physically precedes a given one.

use crate::block::{BlockRef, HEADER_SIZE};
use crate::config::HEADER_MAGIC;
use core::ptr::{self, NonNull};

/// Size of the record at the start of every region.
pub const REGION_HEADER_SIZE: usize = 32;

const REGION_MAGIC: u32 = !HEADER_MAGIC;

#[repr(C)]
struct RegionHeader {
    /// Total bytes in the mapping, including this record.
    len: usize,
    /// Pages obtained from the source.
    pages: usize,
    next: *mut RegionHeader,
    magic: u32,
    _reserved: u32,
    #[cfg(target_pointer_width = "32")]
    _pad: [u32; 3],
}

const _: () = assert!(core::mem::size_of::<RegionHeader>() == REGION_HEADER_SIZE);

/// Handle to a region record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Region(NonNull<RegionHeader>);

impl Region {
    #[inline]
    pub fn base(self) -> NonNull<u8> {
        self.0.cast()
    }

    #[inline]
    pub fn len(self) -> usize {
        unsafe { (*self.0.as_ptr()).len }
    }

    #[inline]
    pub fn pages(self) -> usize {
        unsafe { (*self.0.as_ptr()).pages }
    }

    #[inline]
    fn next(self) -> Option<Region> {
        NonNull::new(unsafe { (*self.0.as_ptr()).next }).map(Region)
    }

    /// Address of the first block.
    #[inline]
    pub fn first_block_addr(self) -> usize {
        self.base().as_ptr() as usize + REGION_HEADER_SIZE
    }

    /// One past the last byte of the region.
    #[inline]
    pub fn end(self) -> usize {
        self.base().as_ptr() as usize + self.len()
    }

    /// Whether `addr` lies inside the block area of this region.
    #[inline]
    pub fn contains(self, addr: usize) -> bool {
        addr >= self.first_block_addr() && addr < self.end()
    }

    /// Bytes available for blocks.
    #[inline]
    pub fn usable(self) -> usize {
        self.len() - REGION_HEADER_SIZE
    }

    /// Validate a block header at `addr`, which must lie in this region with
    /// the whole block inside the region.
    pub fn block_at(self, addr: usize) -> Option<BlockRef> {
        if !self.contains(addr) || addr + HEADER_SIZE > self.end() {
            return None;
        }
        let block = unsafe { BlockRef::validate(NonNull::new(addr as *mut u8)?) }?;
        if block.end() > self.end() {
            return None;
        }
        Some(block)
    }

    /// Walk the blocks of this region in address order.
    pub fn blocks(self) -> Blocks {
        Blocks {
            region: self,
            cursor: self.first_block_addr(),
            corrupt: false,
        }
    }
}

/// Iterator over the blocks of a region. Stops early, and sets
/// [`Blocks::corrupt`], if a header on the way fails validation.
pub(crate) struct Blocks {
    region: Region,
    cursor: usize,
    corrupt: bool,
}

impl Blocks {
    /// Whether the walk ended on a bad header instead of the region end.
    pub fn corrupt(&self) -> bool {
        self.corrupt
    }
}

impl Iterator for Blocks {
    type Item = BlockRef;

    fn next(&mut self) -> Option<BlockRef> {
        if self.corrupt || self.cursor >= self.region.end() {
            return None;
        }
        match self.region.block_at(self.cursor) {
            Some(block) => {
                self.cursor = block.end();
                Some(block)
            }
            None => {
                self.corrupt = true;
                None
            }
        }
    }
}

/// Singly-linked list of the regions owned by a heap, newest first.
pub(crate) struct RegionList {
    head: *mut RegionHeader,
    count: usize,
}

impl RegionList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            count: 0,
        }
    }

    /// Write a region record at `base` and link it in.
    ///
    /// # Safety
    /// `base` must be the start of a fresh, writable, page-aligned mapping of
    /// `len` bytes (`pages` pages) that is not already in the list.
    pub unsafe fn push(&mut self, base: NonNull<u8>, pages: usize, len: usize) -> Region {
        let header = base.cast::<RegionHeader>();
        unsafe {
            header.as_ptr().write(RegionHeader {
                len,
                pages,
                next: self.head,
                magic: REGION_MAGIC,
                _reserved: 0,
                #[cfg(target_pointer_width = "32")]
                _pad: [0; 3],
            });
        }
        self.head = header.as_ptr();
        self.count += 1;
        Region(header)
    }

    /// Unlink the newest region. Used to hand back a region that was never
    /// carved.
    pub fn pop(&mut self) -> Option<Region> {
        let region = NonNull::new(self.head).map(Region)?;
        self.head = unsafe { (*region.0.as_ptr()).next };
        self.count -= 1;
        Some(region)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub fn iter(&self) -> Regions {
        Regions {
            current: NonNull::new(self.head).map(Region),
        }
    }

    /// The region whose block area contains `addr`.
    pub fn find(&self, addr: usize) -> Option<Region> {
        self.iter().find(|r| r.contains(addr))
    }

    /// Validate a block header at `addr` anywhere in the heap.
    pub fn block_at(&self, addr: usize) -> Option<BlockRef> {
        self.find(addr)?.block_at(addr)
    }

    /// Locate the block whose header is at `addr` by walking its region, and
    /// return it together with its physical predecessor.
    ///
    /// Returns `None` if `addr` is outside the heap, falls inside a block
    /// rather than on a header, or the walk hits a corrupted header first.
    pub fn locate(&self, addr: usize) -> Option<(Region, Option<BlockRef>, BlockRef)> {
        let region = self.find(addr)?;
        let mut prev = None;
        for block in region.blocks() {
            if block.addr() == addr {
                return Some((region, prev, block));
            }
            if block.addr() > addr {
                return None;
            }
            prev = Some(block);
        }
        None
    }
}

/// Iterator over a [`RegionList`].
pub(crate) struct Regions {
    current: Option<Region>,
}

impl Iterator for Regions {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let region = self.current?;
        debug_assert_eq!(unsafe { (*region.0.as_ptr()).magic }, REGION_MAGIC);
        self.current = region.next();
        Some(region)
    }
}
