//! Alignment and rounding arithmetic.
//!
//! All helpers are checked: overflow yields `None` rather than wrapping, so
//! callers can turn it into [`ArenaError::SizeOverflow`](crate::ArenaError).

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Round `value` up to a multiple of `granule`, which need not be a power
/// of two.
#[inline]
pub(crate) fn round_up(value: usize, granule: usize) -> Option<usize> {
    debug_assert!(granule > 0);
    match value % granule {
        0 => Some(value),
        rem => value.checked_add(granule - rem),
    }
}
