//! Block headers and the typed view over them.
//!
//! Every block starts with a 32-byte [`BlockHeader`]; the user's data follows
//! immediately. All raw reads and writes of header memory happen in this
//! module. The rest of the heap handles blocks through [`BlockRef`], which
//! is only created for an address whose header has been written by
//! [`BlockRef::init`] or checked by [`BlockRef::validate`].

use crate::config::{ALIGNMENT, HEADER_MAGIC};
use core::ptr::{self, NonNull};

/// Size of a block header in bytes. Part of the binary layout contract.
pub const HEADER_SIZE: usize = 32;

const FREE: u32 = 1;
const USED: u32 = 0;

#[repr(C)]
pub(crate) struct BlockHeader {
    /// Block size including this header.
    size: usize,
    /// `HEADER_MAGIC` while the block is live, 0 once retired.
    magic: u32,
    /// `FREE` or `USED`.
    free: u32,
    /// Next free block; only meaningful while free.
    next: *mut BlockHeader,
    /// Previous free block; only meaningful while free.
    prev: *mut BlockHeader,
    #[cfg(target_pointer_width = "32")]
    _pad: [u32; 3],
}

const _: () = assert!(core::mem::size_of::<BlockHeader>() == HEADER_SIZE);
const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
// Headers are read through `*const BlockHeader`, and callers are promised 8 bytes.
const _: () = assert!(ALIGNMENT >= core::mem::align_of::<BlockHeader>() && ALIGNMENT >= 8);

/// A handle to a block header that has been written or validated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct BlockRef(NonNull<BlockHeader>);

impl BlockRef {
    /// Write a fresh header of `size` bytes at `addr`.
    ///
    /// # Safety
    /// `[addr, addr + size)` must be writable memory owned by the heap, not
    /// overlapping any other block, and `addr` must be `ALIGNMENT`-aligned.
    pub unsafe fn init(addr: NonNull<u8>, size: usize, free: bool) -> Self {
        let header = addr.cast::<BlockHeader>();
        unsafe {
            header.as_ptr().write(BlockHeader {
                size,
                magic: HEADER_MAGIC,
                free: if free { FREE } else { USED },
                next: ptr::null_mut(),
                prev: ptr::null_mut(),
                #[cfg(target_pointer_width = "32")]
                _pad: [0; 3],
            });
        }
        Self(header)
    }

    /// Trust the header at `addr` if it is aligned and carries the sentinel.
    ///
    /// # Safety
    /// `[addr, addr + HEADER_SIZE)` must be readable.
    pub unsafe fn validate(addr: NonNull<u8>) -> Option<Self> {
        if addr.as_ptr() as usize % ALIGNMENT != 0 {
            return None;
        }
        let header = addr.cast::<BlockHeader>();
        let magic = unsafe { ptr::addr_of!((*header.as_ptr()).magic).read() };
        if magic != HEADER_MAGIC {
            return None;
        }
        let size = unsafe { ptr::addr_of!((*header.as_ptr()).size).read() };
        if size < HEADER_SIZE || size % ALIGNMENT != 0 {
            return None;
        }
        Some(Self(header))
    }

    /// Header address for a user data pointer. Not validated.
    #[inline]
    pub fn header_addr(data: NonNull<u8>) -> usize {
        (data.as_ptr() as usize).wrapping_sub(HEADER_SIZE)
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub fn as_ptr(self) -> *mut BlockHeader {
        self.0.as_ptr()
    }

    /// One past the last byte of the block.
    #[inline]
    pub fn end(self) -> usize {
        self.addr() + self.size()
    }

    /// Pointer handed to the user.
    #[inline]
    pub fn data(self) -> NonNull<u8> {
        unsafe { self.0.cast::<u8>().add(HEADER_SIZE) }
    }

    /// Bytes usable by the caller.
    #[inline]
    pub fn capacity(self) -> usize {
        self.size() - HEADER_SIZE
    }

    #[inline]
    pub fn size(self) -> usize {
        unsafe { (*self.as_ptr()).size }
    }

    #[inline]
    pub fn set_size(self, size: usize) {
        unsafe { (*self.as_ptr()).size = size };
    }

    #[inline]
    pub fn is_free(self) -> bool {
        unsafe { (*self.as_ptr()).free == FREE }
    }

    #[inline]
    pub fn set_free(self, free: bool) {
        unsafe { (*self.as_ptr()).free = if free { FREE } else { USED } };
    }

    /// Clear the sentinel so later lookups reject this address.
    #[inline]
    pub fn retire(self) {
        unsafe { (*self.as_ptr()).magic = 0 };
    }

    /// Raw `next` link. Must be validated before it is followed.
    #[inline]
    pub fn next_raw(self) -> *mut u8 {
        unsafe { (*self.as_ptr()).next as *mut u8 }
    }

    #[inline]
    pub fn prev_raw(self) -> *mut u8 {
        unsafe { (*self.as_ptr()).prev as *mut u8 }
    }

    #[inline]
    pub fn set_next(self, next: Option<BlockRef>) {
        unsafe { (*self.as_ptr()).next = next.map_or(ptr::null_mut(), BlockRef::as_ptr) };
    }

    #[inline]
    pub fn set_prev(self, prev: Option<BlockRef>) {
        unsafe { (*self.as_ptr()).prev = prev.map_or(ptr::null_mut(), BlockRef::as_ptr) };
    }

    /// Trusted `next` link, for blocks whose links were written by the free
    /// list itself.
    #[inline]
    pub fn next(self) -> Option<BlockRef> {
        NonNull::new(self.next_raw()).map(|p| Self(p.cast()))
    }

    #[inline]
    pub fn prev(self) -> Option<BlockRef> {
        NonNull::new(self.prev_raw()).map(|p| Self(p.cast()))
    }
}
