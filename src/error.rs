use thiserror::Error;

/// Why the managed region could not grow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtendError {
  #[error("heap exhausted: requested {increment} bytes, {available} available")]
  Exhausted { increment: usize, available: usize },

  #[error("sbrk refused to grow the break by {increment} bytes (errno {errno})")]
  Refused { increment: usize, errno: i32 },

  #[error("increment of {increment} bytes is too large")]
  TooLarge { increment: usize },

  #[error("new space at {actual:#x} does not continue the heap ending at {expected:#x}")]
  Discontiguous { expected: usize, actual: usize },
}

/// The allocator's only recoverable failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
  #[error("out of memory: cannot satisfy a request for {requested} bytes")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: ExtendError,
  },
}

impl AllocError {
  pub(crate) fn out_of_memory(
    requested: usize,
    source: ExtendError,
  ) -> Self {
    Self::OutOfMemory { requested, source }
  }

  /// Bytes the failed call asked for.
  pub fn requested(&self) -> usize {
    match self {
      Self::OutOfMemory { requested, .. } => *requested,
    }
  }
}

/// Inconsistency found by [`Allocator::check_heap`](crate::Allocator::check_heap).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapCheckError {
  #[error("heap has not been initialized")]
  Uninitialized,

  #[error("prologue block is corrupted (word {word:#x})")]
  BadPrologue { word: u32 },

  #[error("epilogue at {addr:#x} is corrupted (word {word:#x})")]
  BadEpilogue { addr: usize, word: u32 },

  #[error("block payload at {addr:#x} is not aligned")]
  Misaligned { addr: usize },

  #[error("block at {addr:#x} has invalid size {size}")]
  BadSize { addr: usize, size: usize },

  #[error("block at {addr:#x} has header {header:#x} but footer {footer:#x}")]
  HeaderFooterMismatch { addr: usize, header: u32, footer: u32 },

  #[error("free blocks at {first:#x} and {second:#x} were not coalesced")]
  AdjacentFree { first: usize, second: usize },

  #[error("block at {addr:#x} lies outside the heap")]
  OutOfBounds { addr: usize },

  #[error("block walk ended at {walked:#x} but the break is at {brk:#x}")]
  BreakMismatch { walked: usize, brk: usize },
}
