//! Unix virtual memory implementation using mmap/munmap/mprotect.

use super::Protection;
use core::ffi::c_void;

fn prot_flags(prot: Protection) -> libc::c_int {
    match prot {
        Protection::NoAccess => libc::PROT_NONE,
        Protection::ReadOnly => libc::PROT_READ,
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        Protection::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
    }
}

pub fn page_size() -> Option<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        None
    } else {
        Some(size as usize)
    }
}

pub unsafe fn map_pages(size: usize, prot: Protection) -> *mut u8 {
    let ptr = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            size,
            prot_flags(prot),
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        core::ptr::null_mut()
    } else {
        ptr as *mut u8
    }
}

pub unsafe fn unmap_pages(ptr: *mut u8, size: usize) -> bool {
    unsafe { libc::munmap(ptr as *mut c_void, size) == 0 }
}

pub unsafe fn protect_pages(ptr: *mut u8, size: usize, prot: Protection) -> bool {
    unsafe { libc::mprotect(ptr as *mut c_void, size, prot_flags(prot)) == 0 }
}
