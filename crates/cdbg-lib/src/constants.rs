//! Constants and bounds shared across the library.

/// Minimum supported k-mer length.
pub const MIN_K: usize = 5;

/// Maximum supported k-mer length (two bits per symbol in a 128-bit window).
pub const MAX_K: usize = 63;

/// Default seed for the window hash finalizer.
pub const DEFAULT_SEED: u64 = 1;

/// Default spacing, in k-mers, between interior tags on a unitig.
pub const DEFAULT_TAG_DENSITY: usize = 8;

/// Sentinel for "no component assigned yet".
pub const NULL_COMPONENT: u64 = u64::MAX;

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// Check that a k-mer length is supported.
#[inline]
pub const fn is_valid_k(k: usize) -> bool {
    k >= MIN_K && k <= MAX_K
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_k() {
        assert!(is_valid_k(5));
        assert!(is_valid_k(21));
        assert!(is_valid_k(63));

        assert!(!is_valid_k(4));
        assert!(!is_valid_k(0));
        assert!(!is_valid_k(64));
    }
}
