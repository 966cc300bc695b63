/// Rounds the given size up to the heap's alignment unit (8 bytes).
///
/// Every block size and every payload address handed out by the allocator
/// is a multiple of [`ALIGNMENT`](crate::ALIGNMENT).
///
/// # Examples
///
/// ```rust
/// use rheap::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(24), 24);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::ALIGNMENT - 1) & !($crate::ALIGNMENT - 1)
  };
}

/// Returns `true` when `value` is a multiple of the alignment unit.
pub const fn is_aligned(value: usize) -> bool {
  value & (crate::ALIGNMENT - 1) == 0
}
