//! Constant-time helpers.
//!
//! Used where secret-dependent data is compared or inspected: session key
//! equality and PKCS#7 pad validation in the message codec.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
///
/// ```rust
/// use shroud_crypto::utils::constant_time_compare;
///
/// assert!(constant_time_compare(b"same", b"same"));
/// assert!(!constant_time_compare(b"same", b"diff"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two fixed-size arrays in constant time.
pub fn constant_time_compare_array<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    constant_time_eq(a, b)
}

/// Returns `0xFF` when `a < b`, otherwise `0x00`, without branching.
#[inline]
pub(crate) fn ct_lt_mask(a: u8, b: u8) -> u8 {
    ((a as u16).wrapping_sub(b as u16) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare(b"hello world", b"hello world"));
    }

    #[test]
    fn test_constant_time_compare_different_length() {
        assert!(!constant_time_compare(b"hello", b"hello world"));
    }

    #[test]
    fn test_constant_time_compare_array_different() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[31] = 1;
        assert!(!constant_time_compare_array(&a, &b));
    }

    #[test]
    fn test_ct_lt_mask() {
        assert_eq!(ct_lt_mask(0, 1), 0xFF);
        assert_eq!(ct_lt_mask(15, 16), 0xFF);
        assert_eq!(ct_lt_mask(16, 16), 0x00);
        assert_eq!(ct_lt_mask(255, 0), 0x00);
        assert_eq!(ct_lt_mask(0, 255), 0xFF);
    }
}
