use std::ptr::{self, NonNull};

use tracing::debug;

use crate::{
  DSIZE, WSIZE,
  block::{Block, Word},
  error::{AllocError, ExtendError},
  extend::HeapExtender,
};

/// Bytes written by [`HeapState::bootstrap`]: padding, prologue header and
/// footer, epilogue header.
pub(crate) const BOOTSTRAP_SIZE: usize = 4 * WSIZE;

/// Boundaries of the managed region.
///
/// ```text
///   heap_lo                                                        brk
///   ▼                                                               ▼
///   ┌─────┬─────────┬─────────┬───────────────────────┬───────────┐
///   │ pad │ pro hdr │ pro ftr │   blocks ...          │ epi hdr   │
///   └─────┴─────────┴─────────┴───────────────────────┴───────────┘
///                   ▲
///                   └── prologue (payload pointer)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HeapState {
  lo: NonNull<u8>,
  brk: NonNull<u8>,
  prologue: Block,
}

impl HeapState {
  /// Requests the sentinel words from `extender` and writes the padding
  /// word, the prologue block and the epilogue header.
  pub(crate) unsafe fn bootstrap<E: HeapExtender>(extender: &mut E) -> Result<Self, AllocError> {
    unsafe {
      let lo = extender
        .extend(BOOTSTRAP_SIZE)
        .map_err(|source| AllocError::out_of_memory(BOOTSTRAP_SIZE, source))?;

      ptr::write(lo.as_ptr().cast::<Word>(), 0);

      let prologue = Block::from_payload(lo.add(DSIZE));
      prologue.write(DSIZE, true);
      prologue.next().write_header(0, true);

      debug!(heap_lo = ?lo, "wrote heap sentinels");

      Ok(Self {
        lo,
        brk: lo.add(BOOTSTRAP_SIZE),
        prologue,
      })
    }
  }

  /// Accepts space fresh from the extender, refusing it unless it starts
  /// at the current break.
  pub(crate) unsafe fn grow(
    &mut self,
    start: NonNull<u8>,
    increment: usize,
  ) -> Result<(), ExtendError> {
    if start != self.brk {
      return Err(ExtendError::Discontiguous {
        expected: self.brk.as_ptr() as usize,
        actual: start.as_ptr() as usize,
      });
    }

    self.brk = unsafe { start.add(increment) };
    Ok(())
  }

  pub(crate) fn prologue(&self) -> Block {
    self.prologue
  }

  /// The first block after the prologue, possibly the epilogue.
  pub(crate) fn first_block(&self) -> Block {
    unsafe { self.prologue.next() }
  }

  /// The zero-sized block whose header is the last word of the heap.
  pub(crate) fn epilogue(&self) -> Block {
    unsafe { Block::from_payload(self.brk) }
  }

  /// First byte of the heap.
  pub fn heap_lo(&self) -> *const u8 {
    self.lo.as_ptr()
  }

  /// Last byte of the heap.
  pub fn heap_hi(&self) -> *const u8 {
    self.brk.as_ptr().wrapping_sub(1)
  }

  /// One past the last byte of the heap.
  pub(crate) fn brk(&self) -> NonNull<u8> {
    self.brk
  }

  pub fn heap_size(&self) -> usize {
    self.brk.as_ptr() as usize - self.lo.as_ptr() as usize
  }

  /// Whether `addr` falls inside the heap.
  pub(crate) fn contains(
    &self,
    addr: usize,
  ) -> bool {
    addr >= self.lo.as_ptr() as usize && addr < self.brk.as_ptr() as usize
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ALIGNMENT, extend::MemLib};

  #[test]
  fn test_bootstrap_writes_sentinels() {
    let mut memlib = MemLib::new(64);

    unsafe {
      let heap = HeapState::bootstrap(&mut memlib).unwrap();

      assert_eq!(heap.heap_size(), BOOTSTRAP_SIZE);
      assert_eq!(heap.heap_lo(), memlib.heap_lo());
      assert_eq!(heap.heap_hi(), memlib.heap_hi());

      let prologue = heap.prologue();
      assert_eq!(prologue.size(), DSIZE);
      assert!(prologue.is_allocated());
      assert_eq!(prologue.header_word(), prologue.footer_word());
      assert_eq!(prologue.addr() % ALIGNMENT, 0);

      let epilogue = heap.first_block();
      assert_eq!(epilogue, heap.epilogue());
      assert!(epilogue.is_epilogue());
      assert!(epilogue.is_allocated());
    }
  }

  #[test]
  fn test_bootstrap_failure() {
    let mut memlib = MemLib::new(8);

    let err = unsafe { HeapState::bootstrap(&mut memlib) }.unwrap_err();
    assert_eq!(err.requested(), BOOTSTRAP_SIZE);
  }

  #[test]
  fn test_grow_rejects_gaps() {
    let mut memlib = MemLib::new(128);

    unsafe {
      let mut heap = HeapState::bootstrap(&mut memlib).unwrap();
      let brk = heap.brk();

      let err = heap.grow(brk.add(8), 16).unwrap_err();
      assert!(matches!(err, ExtendError::Discontiguous { .. }));
      assert_eq!(heap.brk(), brk);

      heap.grow(brk, 16).unwrap();
      assert_eq!(heap.heap_size(), BOOTSTRAP_SIZE + 16);
      assert!(heap.contains(brk.as_ptr() as usize));
      assert!(!heap.contains(heap.brk().as_ptr() as usize));
    }
  }
}
