use core::fmt;

/// Reasons a heap operation did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// A zero-byte allocation was requested.
    ZeroSize,
    /// The page source declined to provide memory, or the request size
    /// overflowed.
    AllocationFailure,
    /// The pointer does not address the data of a live block in this heap.
    InvalidPointer,
    /// The block was already free.
    DoubleFree,
    /// A free list node failed validation while searching for a fit.
    CorruptedFreeList,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::ZeroSize => f.write_str("zero-sized allocation"),
            HeapError::AllocationFailure => f.write_str("page source could not satisfy the request"),
            HeapError::InvalidPointer => f.write_str("pointer is not a live block of this heap"),
            HeapError::DoubleFree => f.write_str("block is already free"),
            HeapError::CorruptedFreeList => f.write_str("free list node failed validation"),
        }
    }
}

impl core::error::Error for HeapError {}
