//! In-band block metadata.
//!
//! ```text
//!          header                                     footer
//!   ┌──────────────────┬───────────────────────────┬──────────────────┐
//!   │ size | allocated │          payload          │ size | allocated │
//!   └──────────────────┴───────────────────────────┴──────────────────┘
//!     4 bytes          ▲                              4 bytes
//!                      └── Block (payload pointer)
//! ```
//!
//! A [`Block`] is identified by its payload pointer. Neighbours are found
//! purely from addresses: the next block starts `size` bytes after this
//! payload, the previous one ends right before this header, and its footer
//! tells how far back its payload is.

use std::ptr::{self, NonNull};

/// A single metadata word.
pub type Word = u32;

/// Bytes in a metadata word.
pub const WSIZE: usize = size_of::<Word>();

/// Bytes in a double word.
pub const DSIZE: usize = 2 * WSIZE;

/// Alignment unit of block sizes and payload addresses.
pub const ALIGNMENT: usize = DSIZE;

/// Header plus footer.
pub const OVERHEAD: usize = 2 * WSIZE;

/// Smallest real block: metadata plus one double word of payload.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Largest block size a metadata word can hold.
pub const MAX_BLOCK_SIZE: usize = (Word::MAX as usize) & !(ALIGNMENT - 1);

const ALLOCATED_BIT: Word = 0x1;
const SIZE_MASK: Word = !0x7;

/// Encodes `(size, allocated)` into one metadata word.
///
/// `size` must be a multiple of [`ALIGNMENT`] no larger than
/// [`MAX_BLOCK_SIZE`].
pub const fn pack(
  size: usize,
  allocated: bool,
) -> Word {
  debug_assert!(size <= MAX_BLOCK_SIZE);
  (size as Word) | (allocated as Word)
}

/// Size stored in a metadata word.
pub const fn unpack_size(word: Word) -> usize {
  (word & SIZE_MASK) as usize
}

/// Allocated bit stored in a metadata word.
pub const fn unpack_allocated(word: Word) -> bool {
  word & ALLOCATED_BIT != 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block(NonNull<u8>);

impl Block {
  /// # Safety
  ///
  /// `payload` must point just past a readable header word inside the heap.
  pub const unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  pub const fn payload(self) -> NonNull<u8> {
    self.0
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub unsafe fn header(self) -> *mut Word {
    unsafe { self.0.as_ptr().sub(WSIZE).cast() }
  }

  pub unsafe fn footer(self) -> *mut Word {
    unsafe { self.0.as_ptr().add(self.size() - DSIZE).cast() }
  }

  pub unsafe fn header_word(self) -> Word {
    unsafe { ptr::read(self.header()) }
  }

  pub unsafe fn footer_word(self) -> Word {
    unsafe { ptr::read(self.footer()) }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { unpack_size(self.header_word()) }
  }

  pub unsafe fn is_allocated(self) -> bool {
    unsafe { unpack_allocated(self.header_word()) }
  }

  /// Bytes the caller may use.
  pub unsafe fn usable_size(self) -> usize {
    unsafe { self.size() - OVERHEAD }
  }

  /// The zero-sized block terminating the heap.
  pub unsafe fn is_epilogue(self) -> bool {
    unsafe { self.size() == 0 }
  }

  pub unsafe fn next(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// Reads the previous block's size from its footer, which sits right
  /// before this block's header.
  pub unsafe fn prev(self) -> Block {
    unsafe {
      let prev_footer = self.0.as_ptr().sub(DSIZE).cast::<Word>();
      let prev_size = unpack_size(ptr::read(prev_footer));
      Block(self.0.sub(prev_size))
    }
  }

  /// Writes matching header and footer words.
  pub unsafe fn write(
    self,
    size: usize,
    allocated: bool,
  ) {
    unsafe {
      let word = pack(size, allocated);
      ptr::write(self.header(), word);
      ptr::write(self.0.as_ptr().add(size - DSIZE).cast::<Word>(), word);
    }
  }

  /// Writes only the header word. Used for the epilogue, which has no
  /// footer.
  pub unsafe fn write_header(
    self,
    size: usize,
    allocated: bool,
  ) {
    unsafe { ptr::write(self.header(), pack(size, allocated)) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 8-aligned scratch space.
  fn arena(words: usize) -> Vec<u64> {
    vec![0u64; words]
  }

  #[test]
  fn test_pack() {
    assert_eq!(pack(16, true), 17);
    assert_eq!(pack(4096, false), 4096);
    assert_eq!(unpack_size(pack(24, true)), 24);
    assert!(unpack_allocated(pack(24, true)));
    assert!(!unpack_allocated(pack(24, false)));
    assert_eq!(unpack_size(pack(0, true)), 0);
  }

  #[test]
  fn test_constants() {
    assert_eq!(WSIZE, 4);
    assert_eq!(ALIGNMENT, 8);
    assert_eq!(MIN_BLOCK_SIZE, 16);
    assert_eq!(MAX_BLOCK_SIZE % ALIGNMENT, 0);
  }

  #[test]
  fn test_write_and_navigate() {
    let mut memory = arena(16);
    let base = memory.as_mut_ptr().cast::<u8>();

    unsafe {
      // Two blocks of 24 and 32 bytes, first payload at base + 8.
      let first = Block::from_payload(NonNull::new_unchecked(base.add(8)));
      first.write(24, true);

      let second = first.next();
      assert_eq!(second.addr(), first.addr() + 24);
      second.write(32, false);

      assert_eq!(first.size(), 24);
      assert!(first.is_allocated());
      assert_eq!(first.usable_size(), 16);
      assert_eq!(first.header_word(), first.footer_word());

      assert_eq!(second.size(), 32);
      assert!(!second.is_allocated());
      assert_eq!(second.header_word(), second.footer_word());

      assert_eq!(second.prev(), first);

      second.next().write_header(0, true);
      assert!(second.next().is_epilogue());
      assert!(second.next().is_allocated());
    }
  }

  #[test]
  fn test_payload_alignment_follows_header() {
    let mut memory = arena(4);
    let base = memory.as_mut_ptr().cast::<u8>();

    unsafe {
      let block = Block::from_payload(NonNull::new_unchecked(base.add(8)));
      block.write(16, false);
      assert_eq!(block.header() as usize, base as usize + 4);
      assert_eq!(block.footer() as usize, base as usize + 16);
      assert_eq!(block.addr() % ALIGNMENT, 0);
    }
  }
}
