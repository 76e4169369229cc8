//! Windows virtual memory implementation using VirtualAlloc/VirtualFree/VirtualProtect.

use super::Protection;
use core::ffi::c_void;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_RELEASE: u32 = 0x8000;
const PAGE_NOACCESS: u32 = 0x01;
const PAGE_READONLY: u32 = 0x02;
const PAGE_READWRITE: u32 = 0x04;
const PAGE_EXECUTE_READ: u32 = 0x20;
const PAGE_EXECUTE_READWRITE: u32 = 0x40;

#[repr(C)]
struct SystemInfo {
    processor_architecture: u16,
    reserved: u16,
    page_size: u32,
    minimum_application_address: *mut c_void,
    maximum_application_address: *mut c_void,
    active_processor_mask: usize,
    number_of_processors: u32,
    processor_type: u32,
    allocation_granularity: u32,
    processor_level: u16,
    processor_revision: u16,
}

unsafe extern "system" {
    #[link_name = "VirtualAlloc"]
    fn virtual_alloc(
        lp_address: *mut c_void,
        dw_size: usize,
        fl_allocation_type: u32,
        fl_protect: u32,
    ) -> *mut c_void;

    #[link_name = "VirtualFree"]
    fn virtual_free(lp_address: *mut c_void, dw_size: usize, dw_free_type: u32) -> i32;

    #[link_name = "VirtualProtect"]
    fn virtual_protect(
        lp_address: *mut c_void,
        dw_size: usize,
        fl_new_protect: u32,
        lpfl_old_protect: *mut u32,
    ) -> i32;

    #[link_name = "GetSystemInfo"]
    fn get_system_info(lp_system_info: *mut SystemInfo);
}

fn prot_flags(prot: Protection) -> u32 {
    match prot {
        Protection::NoAccess => PAGE_NOACCESS,
        Protection::ReadOnly => PAGE_READONLY,
        Protection::ReadWrite => PAGE_READWRITE,
        Protection::ReadExecute => PAGE_EXECUTE_READ,
        Protection::ReadWriteExecute => PAGE_EXECUTE_READWRITE,
    }
}

pub fn page_size() -> Option<usize> {
    let mut info = core::mem::MaybeUninit::<SystemInfo>::zeroed();
    unsafe { get_system_info(info.as_mut_ptr()) };
    let size = unsafe { info.assume_init() }.page_size as usize;
    if size == 0 { None } else { Some(size) }
}

pub unsafe fn map_pages(size: usize, prot: Protection) -> *mut u8 {
    let ptr = unsafe {
        virtual_alloc(
            core::ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            prot_flags(prot),
        )
    };
    ptr as *mut u8
}

pub unsafe fn unmap_pages(ptr: *mut u8, _size: usize) -> bool {
    // MEM_RELEASE requires dwSize = 0 (releases entire allocation)
    unsafe { virtual_free(ptr as *mut c_void, 0, MEM_RELEASE) != 0 }
}

pub unsafe fn protect_pages(ptr: *mut u8, size: usize, prot: Protection) -> bool {
    let mut old = 0u32;
    unsafe { virtual_protect(ptr as *mut c_void, size, prot_flags(prot), &mut old) != 0 }
}
