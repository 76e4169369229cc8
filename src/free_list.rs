//! Doubly-linked list of free blocks, threaded through the block headers.
//!
//! Insertion is always at the head; the list is not sorted by size or
//! address. Every block whose header says free is on the list, and every
//! block on the list says free.

use crate::block::BlockRef;
use core::ptr;

pub(crate) struct FreeList {
    head: *mut u8,
    count: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            count: 0,
        }
    }

    /// Raw head pointer. Must be validated before it is followed.
    #[inline]
    pub fn head_raw(&self) -> *mut u8 {
        self.head
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Prepend a block to the front of the list.
    ///
    /// # Safety
    ///
    /// `block` must be a free block not already in a list, and the current
    /// head (if any) must be a valid block.
    pub unsafe fn push(&mut self, block: BlockRef) {
        let old = self.head_block();
        debug_assert!(old.is_some() || self.head.is_null(), "push onto a damaged head");
        block.set_next(old);
        block.set_prev(None);
        if let Some(old) = old {
            old.set_prev(Some(block));
        }
        self.head = block.as_ptr() as *mut u8;
        self.count += 1;
    }

    /// Whether the list links agree that `block` is an entry: either it is
    /// the head, or its predecessor points back at it.
    ///
    /// # Safety
    ///
    /// `block`'s `prev` link, if set, must point at readable block memory.
    pub unsafe fn contains(&self, block: BlockRef) -> bool {
        let addr = block.as_ptr() as *mut u8;
        match block.prev() {
            Some(prev) => prev.next_raw() == addr,
            None => self.head == addr,
        }
    }

    /// Unlink a specific block. Returns `false`, and changes nothing, if the
    /// links show the block is not on this list.
    ///
    /// # Safety
    ///
    /// `block`'s links must point at readable block memory, and if it is on
    /// this list its neighbours must be valid blocks.
    pub unsafe fn remove(&mut self, block: BlockRef) -> bool {
        if !unsafe { self.contains(block) } {
            return false;
        }
        let prev = block.prev();
        let next = block.next();
        match prev {
            Some(prev) => prev.set_next(next),
            None => self.head = next.map_or(ptr::null_mut(), |n| n.as_ptr() as *mut u8),
        }
        if let Some(next) = next {
            next.set_prev(prev);
        }
        block.set_prev(None);
        block.set_next(None);
        debug_assert!(self.count > 0, "free list count out of step with its links");
        self.count -= 1;
        true
    }

    /// Put `new` in the exact position `old` occupies and take `old` out.
    ///
    /// # Safety
    ///
    /// `old` must currently be in this list with valid neighbours, and `new`
    /// must be a free block not in any list.
    pub unsafe fn replace(&mut self, old: BlockRef, new: BlockRef) {
        let prev = old.prev();
        let next = old.next();
        new.set_prev(prev);
        new.set_next(next);
        match prev {
            Some(prev) => prev.set_next(Some(new)),
            None => self.head = new.as_ptr() as *mut u8,
        }
        if let Some(next) = next {
            next.set_prev(Some(new));
        }
        old.set_prev(None);
        old.set_next(None);
    }

    /// Drop every entry without touching block memory.
    pub fn clear(&mut self) {
        self.head = ptr::null_mut();
        self.count = 0;
    }

    #[inline]
    fn head_block(&self) -> Option<BlockRef> {
        let head = core::ptr::NonNull::new(self.head)?;
        unsafe { BlockRef::validate(head) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::NonNull;

    #[repr(C, align(8))]
    struct Arena([u8; 512]);

    fn blocks(arena: &mut Arena, n: usize) -> alloc::vec::Vec<BlockRef> {
        (0..n)
            .map(|i| unsafe {
                let addr = NonNull::new(arena.0.as_mut_ptr().add(i * 64)).unwrap();
                BlockRef::init(addr, 64, true)
            })
            .collect()
    }

    fn order(list: &FreeList) -> alloc::vec::Vec<usize> {
        let mut out = alloc::vec::Vec::new();
        let mut cur = NonNull::new(list.head_raw()).and_then(|p| unsafe { BlockRef::validate(p) });
        while let Some(b) = cur {
            out.push(b.addr());
            cur = b.next();
        }
        out
    }

    #[test]
    fn test_push_is_lifo() {
        let mut arena = Arena([0; 512]);
        let b = blocks(&mut arena, 3);
        let mut list = FreeList::new();
        unsafe {
            list.push(b[0]);
            list.push(b[1]);
            list.push(b[2]);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(order(&list), [b[2].addr(), b[1].addr(), b[0].addr()]);
        assert_eq!(b[0].prev(), Some(b[1]));
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut arena = Arena([0; 512]);
        let b = blocks(&mut arena, 4);
        let mut list = FreeList::new();
        unsafe {
            for &blk in &b {
                list.push(blk);
            }
            assert!(list.remove(b[2]));
            assert_eq!(order(&list), [b[3].addr(), b[1].addr(), b[0].addr()]);
            assert!(list.remove(b[3]));
            assert_eq!(order(&list), [b[1].addr(), b[0].addr()]);
            assert!(list.remove(b[0]));
            assert_eq!(order(&list), [b[1].addr()]);
            assert!(list.remove(b[1]));
        }
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut arena = Arena([0; 512]);
        let b = blocks(&mut arena, 4);
        let mut list = FreeList::new();
        unsafe {
            list.push(b[0]);
            list.push(b[1]);
            list.push(b[2]);
            list.replace(b[1], b[3]);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(order(&list), [b[2].addr(), b[3].addr(), b[0].addr()]);
        assert_eq!(b[0].prev(), Some(b[3]));

        unsafe { list.replace(b[2], b[1]) };
        assert_eq!(order(&list), [b[1].addr(), b[3].addr(), b[0].addr()]);
    }

    #[test]
    fn test_remove_ignores_unlisted_block() {
        let mut arena = Arena([0; 512]);
        let b = blocks(&mut arena, 5);
        let mut list = FreeList::new();
        unsafe {
            list.push(b[0]);
            list.push(b[1]);
            // b[3] -> b[4] is a chain the list does not know about.
            b[3].set_next(Some(b[4]));
            b[4].set_prev(Some(b[3]));

            assert!(!list.contains(b[2]));
            assert!(!list.contains(b[3]));
            assert!(!list.remove(b[2]));
            assert!(!list.remove(b[3]));
            assert!(list.contains(b[0]));
        }
        assert_eq!(list.len(), 2);
        assert_eq!(order(&list), [b[1].addr(), b[0].addr()]);
        assert_eq!(b[3].next(), Some(b[4]));
    }
}
