use crate::{MIN_BLOCK_SIZE, align};

/// Tunables for an [`Allocator`](crate::Allocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  chunk_size: usize,
}

impl HeapConfig {
  /// Default extension size (4 KiB).
  pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

  pub const DEFAULT: Self = Self {
    chunk_size: Self::DEFAULT_CHUNK_SIZE,
  };

  /// Minimum number of bytes requested from the extender whenever the heap
  /// has to grow, including the initial extension made by `init`.
  pub const fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  /// Sets the extension size, rounded up to the alignment unit and never
  /// smaller than one minimum block.
  pub const fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    let chunk_size = align!(chunk_size);
    self.chunk_size = if chunk_size < MIN_BLOCK_SIZE {
      MIN_BLOCK_SIZE
    } else {
      chunk_size
    };
    self
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_chunk() {
    assert_eq!(HeapConfig::default().chunk_size(), 4096);
    assert_eq!(HeapConfig::default(), HeapConfig::DEFAULT);
  }

  #[test]
  fn test_chunk_size_is_normalized() {
    assert_eq!(HeapConfig::DEFAULT.with_chunk_size(100).chunk_size(), 104);
    assert_eq!(HeapConfig::DEFAULT.with_chunk_size(0).chunk_size(), MIN_BLOCK_SIZE);
    assert_eq!(HeapConfig::DEFAULT.with_chunk_size(8).chunk_size(), MIN_BLOCK_SIZE);
    assert_eq!(HeapConfig::DEFAULT.with_chunk_size(1 << 16).chunk_size(), 1 << 16);
  }
}
