//! Heap extension service.
//!
//! The allocator never maps memory on its own. It asks a [`HeapExtender`]
//! to push the end of the managed region forward, `sbrk`-style, and formats
//! whatever comes back.

use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};
use tracing::trace;

use crate::{align, error::ExtendError};

/// Grows the managed region.
///
/// # Safety
///
/// Implementors must hand out memory that is readable, writable and owned
/// exclusively by the caller for as long as the extender lives. The first
/// region returned must be [`ALIGNMENT`](crate::ALIGNMENT)-aligned, and each
/// later region must start exactly where the previous one ended. Growth is
/// monotonic: space is never returned twice.
pub unsafe trait HeapExtender {
  /// Extends the region by `increment` bytes and returns the start of the new
  /// space.
  ///
  /// # Safety
  ///
  /// Must not be called concurrently with any other use of the same region.
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError>;
}

/// The process break, moved with `sbrk(2)`.
///
/// Only one `Sbrk` should drive the break at a time, and nothing else in the
/// process should move it while the heap is in use; the allocator reports an
/// interleaved foreign `sbrk` as [`ExtendError::Discontiguous`].
#[derive(Debug, Default)]
pub struct Sbrk {
  aligned: bool,
}

impl Sbrk {
  pub const fn new() -> Self {
    Self { aligned: false }
  }

  /// The current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  unsafe fn bump(increment: usize) -> Result<*mut u8, ExtendError> {
    let delta = intptr_t::try_from(increment).map_err(|_| ExtendError::TooLarge { increment })?;

    let address = unsafe { sbrk(delta) };

    if address == usize::MAX as *mut c_void {
      let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
      return Err(ExtendError::Refused { increment, errno });
    }

    Ok(address as *mut u8)
  }
}

unsafe impl HeapExtender for Sbrk {
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    unsafe {
      if !self.aligned {
        let current = Self::program_break() as usize;
        let padding = align!(current) - current;
        if padding > 0 {
          trace!(padding, "aligning program break");
          Self::bump(padding)?;
        }
        self.aligned = true;
      }

      let address = Self::bump(increment)?;
      trace!(increment, ?address, "moved program break");

      NonNull::new(address).ok_or(ExtendError::Refused { increment, errno: 0 })
    }
  }
}

/// A simulated break over a fixed-size buffer owned by the extender.
///
/// Useful for tests and for running several independent heaps in one
/// process. The buffer never moves, so pointers into it stay valid for the
/// lifetime of the `MemLib`.
pub struct MemLib {
  region: Box<[u64]>,
  brk: usize,
}

impl MemLib {
  /// Capacity used by [`MemLib::default`] (20 MiB).
  pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

  /// Creates a region that can grow up to `max_heap` bytes (rounded up to
  /// the alignment unit).
  pub fn new(max_heap: usize) -> Self {
    let words = align!(max_heap) / size_of::<u64>();
    Self {
      region: vec![0u64; words].into_boxed_slice(),
      brk: 0,
    }
  }

  fn base(&self) -> *const u8 {
    self.region.as_ptr().cast()
  }

  /// Total bytes the region may grow to.
  pub fn capacity(&self) -> usize {
    self.region.len() * size_of::<u64>()
  }

  /// First byte of the region.
  pub fn heap_lo(&self) -> *const u8 {
    self.base()
  }

  /// Last byte handed out so far. Equals `heap_lo() - 1` while empty.
  pub fn heap_hi(&self) -> *const u8 {
    self.base().wrapping_add(self.brk).wrapping_sub(1)
  }

  /// Bytes handed out so far.
  pub fn heap_size(&self) -> usize {
    self.brk
  }

  /// Forgets every extension, returning the break to the start of the
  /// region. Any allocator built on top must be discarded first.
  pub fn reset_brk(&mut self) {
    self.brk = 0;
  }
}

impl Default for MemLib {
  fn default() -> Self {
    Self::new(Self::DEFAULT_MAX_HEAP)
  }
}

impl std::fmt::Debug for MemLib {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("MemLib")
      .field("heap_lo", &self.heap_lo())
      .field("heap_size", &self.brk)
      .field("capacity", &self.capacity())
      .finish()
  }
}

unsafe impl HeapExtender for MemLib {
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    let available = self.capacity() - self.brk;
    if increment > available {
      return Err(ExtendError::Exhausted { increment, available });
    }

    let start = self.region.as_mut_ptr().cast::<u8>().wrapping_add(self.brk);
    self.brk += increment;

    NonNull::new(start).ok_or(ExtendError::Exhausted { increment, available })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ALIGNMENT;

  #[test]
  fn test_memlib_grows_contiguously() {
    let mut memlib = MemLib::new(256);

    unsafe {
      let first = memlib.extend(64).unwrap();
      let second = memlib.extend(32).unwrap();

      assert_eq!(first.as_ptr() as *const u8, memlib.heap_lo());
      assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
      assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 64);
      assert_eq!(memlib.heap_size(), 96);
      assert_eq!(memlib.heap_hi() as usize, memlib.heap_lo() as usize + 95);
    }
  }

  #[test]
  fn test_memlib_exhaustion() {
    let mut memlib = MemLib::new(128);

    unsafe {
      memlib.extend(100).unwrap();

      assert_eq!(
        memlib.extend(64),
        Err(ExtendError::Exhausted {
          increment: 64,
          available: 28,
        })
      );

      // A failed extension leaves the break where it was.
      assert_eq!(memlib.heap_size(), 100);
      assert!(memlib.extend(28).is_ok());
      assert_eq!(memlib.heap_size(), 128);
    }
  }

  #[test]
  fn test_memlib_reset() {
    let mut memlib = MemLib::new(64);

    unsafe {
      let first = memlib.extend(64).unwrap();
      memlib.reset_brk();
      assert_eq!(memlib.heap_size(), 0);

      let again = memlib.extend(16).unwrap();
      assert_eq!(first, again);
    }
  }

  #[test]
  fn test_memlib_capacity_is_aligned() {
    assert_eq!(MemLib::new(13).capacity(), 16);
    assert_eq!(MemLib::default().capacity(), MemLib::DEFAULT_MAX_HEAP);
  }

  #[test]
  #[ignore = "moves the real program break; run alone with --ignored"]
  fn test_sbrk_extends_break() {
    let mut extender = Sbrk::new();

    unsafe {
      let first = extender.extend(64).unwrap();
      assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
      assert!(Sbrk::program_break() as usize >= first.as_ptr() as usize + 64);
    }
  }
}
