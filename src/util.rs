//! Alignment Utilities
//!
//! Helper functions for the packed record layout.

/// Align `value` up to `alignment` (must be a power of two).
///
/// # Examples
/// ```
/// assert_eq!(frame_registry::util::align_up(10, 4), 12);
/// assert_eq!(frame_registry::util::align_up(16, 8), 16);
/// ```
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Check whether `value` is aligned to `alignment` (a power of two).
#[inline]
pub fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}
