#![no_std]

//! blockheap: a two-layer heap allocator.
//!
//! - Page source: whole pages from the OS (mmap / VirtualAlloc), protection
//!   changes and instruction cache maintenance
//! - Block heap: variably sized blocks carved from those pages, with 32-byte
//!   headers, a doubly-linked free list, splitting and coalescing
//! - Global heap: one lazily built block heap behind a lock, usable as a
//!   `static` and as `#[global_allocator]`
//!
//! # Usage
//!
//! ```ignore
//! let mut heap = blockheap::BlockHeap::new();
//! let p = heap.allocate(1024).unwrap();
//! unsafe { heap.free(p.as_ptr()) };
//! ```
//!
//! Headers carry a sentinel, and pointers passed back in are checked against
//! the regions the heap owns before anything is read through them. What the
//! heap does on a failed check is set by [`CorruptionPolicy`].

#[cfg(test)]
extern crate alloc;
#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod block;
pub mod config;
mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
mod free_list;
pub mod global;
pub mod heap;
pub mod icache;
pub mod page_source;
pub mod platform;
mod region;
pub mod stats;

pub use block::HEADER_SIZE;
pub use error::HeapError;
pub use global::GlobalHeap;
pub use heap::{BlockHeap, CorruptionPolicy, MemoryStats};
pub use page_source::{OsPageSource, PageSource};
pub use platform::Protection;
