//! Build-time configuration generated from `blockheap.toml` by `build.rs`.
//!
//! Exposes `FALLBACK_PAGE_SIZE`, `MIN_PAYLOAD`, `ALIGNMENT`, `HEADER_MAGIC`
//! and `DEFAULT_POLICY`.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

/// Round `size` up to the next multiple of `align` (must be a power of 2).
#[inline]
pub const fn round_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(13, 8), 16);
        assert_eq!(round_up(4097, 4096), 8192);
    }

    #[test]
    fn test_generated_values_are_consistent() {
        assert!(FALLBACK_PAGE_SIZE.is_power_of_two());
        assert!(ALIGNMENT.is_power_of_two());
        assert_eq!(MIN_PAYLOAD % ALIGNMENT, 0);
        assert_ne!(HEADER_MAGIC, 0);
    }
}
