//! Instruction cache maintenance for write-then-execute code pages.
//!
//! After writing machine code into memory and before executing it, cores
//! without a hardware-coherent instruction cache must clean the data cache
//! to the point of unification and invalidate the stale instruction cache
//! lines. [`Native`] is the implementation for the build target:
//!
//! - x86 / x86_64: caches are coherent, flushing is a no-op.
//! - aarch64: `dc cvau` + `ic ivau` per line, with the required barriers.
//! - riscv64: `fence.i` on the calling hart.
//! - anything else (and Miri): no-op.

/// Capability to make freshly written code visible to instruction fetch.
pub trait InstructionCache {
    /// Synchronize the instruction cache for `[ptr, ptr + size)`.
    ///
    /// # Safety
    /// The range must be mapped and readable.
    unsafe fn flush(&self, ptr: *const u8, size: usize);
}

/// The instruction cache implementation for the current target architecture.
#[derive(Clone, Copy, Debug, Default)]
pub struct Native;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", not(miri)))] {
        impl InstructionCache for Native {
            unsafe fn flush(&self, ptr: *const u8, size: usize) {
                if size == 0 {
                    return;
                }
                let ctr: u64;
                unsafe { core::arch::asm!("mrs {0}, ctr_el0", out(reg) ctr, options(nomem, nostack)) };
                let dline = 4usize << ((ctr >> 16) & 0xF);
                let iline = 4usize << (ctr & 0xF);
                let start = ptr as usize;
                let end = start + size;

                let mut addr = start & !(dline - 1);
                while addr < end {
                    unsafe { core::arch::asm!("dc cvau, {0}", in(reg) addr, options(nostack)) };
                    addr += dline;
                }
                unsafe { core::arch::asm!("dsb ish", options(nostack)) };

                let mut addr = start & !(iline - 1);
                while addr < end {
                    unsafe { core::arch::asm!("ic ivau, {0}", in(reg) addr, options(nostack)) };
                    addr += iline;
                }
                unsafe { core::arch::asm!("dsb ish", "isb", options(nostack)) };
            }
        }
    } else if #[cfg(all(target_arch = "riscv64", not(miri)))] {
        impl InstructionCache for Native {
            unsafe fn flush(&self, _ptr: *const u8, _size: usize) {
                // Only orders this hart; other harts need a remote fence via the kernel.
                unsafe { core::arch::asm!("fence.i", options(nostack)) };
            }
        }
    } else {
        impl InstructionCache for Native {
            #[inline]
            unsafe fn flush(&self, _ptr: *const u8, _size: usize) {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_plain_memory() {
        let buf = [0xC3u8; 256];
        unsafe { Native.flush(buf.as_ptr(), buf.len()) };
        unsafe { Native.flush(buf.as_ptr(), 0) };
    }
}
