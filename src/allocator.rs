use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::{
  ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
  align::is_aligned,
  block::Block,
  config::HeapConfig,
  error::{AllocError, ExtendError, HeapCheckError},
  extend::HeapExtender,
  heap::HeapState,
};

/// First-fit allocator over an implicit free list.
///
/// Every block carries its size and status in a header and a footer word,
/// so the "list" is just the heap itself walked block by block.
pub struct Allocator<E: HeapExtender> {
  extender: E,
  config: HeapConfig,
  heap: Option<HeapState>,
}

/// A block as seen by [`Allocator::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  /// Total size including header and footer.
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  pub fn usable_size(&self) -> usize {
    self.size - crate::OVERHEAD
  }

  /// Payload byte range, as addresses.
  pub fn payload_range(&self) -> std::ops::Range<usize> {
    let start = self.payload.as_ptr() as usize;
    start..start + self.usable_size()
  }
}

/// Summary returned by a successful [`Allocator::check_heap`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub allocated_bytes: usize,
  pub heap_size: usize,
}

/// Walks the heap from the first real block up to the epilogue.
pub struct Blocks<'a> {
  current: Option<Block>,
  _heap: std::marker::PhantomData<&'a HeapState>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;

    unsafe {
      if block.is_epilogue() {
        self.current = None;
        return None;
      }

      self.current = Some(block.next());

      Some(BlockInfo {
        payload: block.payload(),
        size: block.size(),
        allocated: block.is_allocated(),
      })
    }
  }
}

/// Block size needed to serve a request of `n` usable bytes, or `None` if it
/// cannot be encoded.
fn adjusted_size(n: usize) -> Option<usize> {
  let asize = if n <= DSIZE {
    MIN_BLOCK_SIZE
  } else {
    n.checked_add(DSIZE + DSIZE - 1)? / DSIZE * DSIZE
  };

  (asize <= MAX_BLOCK_SIZE).then_some(asize)
}

/// Sentinels plus one chunk of free space.
fn fresh_heap<E: HeapExtender>(
  extender: &mut E,
  config: HeapConfig,
) -> Result<HeapState, AllocError> {
  let chunk = config.chunk_size();

  unsafe {
    let mut heap = HeapState::bootstrap(extender)?;

    extend_heap(extender, &mut heap, chunk).map_err(|source| {
      warn!(chunk, %source, "initial heap extension failed");
      AllocError::out_of_memory(chunk, source)
    })?;

    debug!(chunk, heap_lo = ?heap.heap_lo(), "heap initialized");
    Ok(heap)
  }
}

/// First free block of at least `asize` bytes, scanning left to right.
unsafe fn find_fit(
  heap: &HeapState,
  asize: usize,
) -> Option<Block> {
  unsafe {
    let mut block = heap.first_block();

    while !block.is_epilogue() {
      if !block.is_allocated() && block.size() >= asize {
        trace!(payload = ?block.payload(), size = block.size(), asize, "found fit");
        return Some(block);
      }
      block = block.next();
    }

    None
  }
}

/// Marks `asize` bytes of the free `block` allocated, splitting off the
/// remainder when it can hold a block of its own.
unsafe fn place(
  block: Block,
  asize: usize,
) {
  unsafe {
    let csize = block.size();

    if csize - asize < MIN_BLOCK_SIZE {
      block.write(csize, true);
    } else {
      block.write(asize, true);
      block.next().write(csize - asize, false);
      trace!(payload = ?block.payload(), asize, remainder = csize - asize, "split block");
    }
  }
}

/// Merges the free `block` with free neighbours and returns the block that
/// now covers it.
unsafe fn coalesce(block: Block) -> Block {
  unsafe {
    let prev = block.prev();
    let next = block.next();
    let mut size = block.size();

    let merged = match (prev.is_allocated(), next.is_allocated()) {
      (true, true) => return block,
      (true, false) => {
        size += next.size();
        block
      }
      (false, true) => {
        size += prev.size();
        prev
      }
      (false, false) => {
        size += prev.size() + next.size();
        prev
      }
    };

    merged.write(size, false);
    trace!(payload = ?merged.payload(), size, "coalesced");
    merged
  }
}

/// Grows the heap by `bytes` (rounded up to the alignment unit, and to at
/// least one minimum block) and returns the new free block, merged with a
/// trailing free block if there was one.
///
/// The whole heap is kept below [`MAX_BLOCK_SIZE`] so that any merge of its
/// blocks still fits a metadata word.
unsafe fn extend_heap<E: HeapExtender>(
  extender: &mut E,
  heap: &mut HeapState,
  bytes: usize,
) -> Result<Block, ExtendError> {
  let Some(size) = bytes
    .max(MIN_BLOCK_SIZE)
    .checked_next_multiple_of(ALIGNMENT)
    .filter(|&size| heap.heap_size().saturating_add(size) <= MAX_BLOCK_SIZE)
  else {
    return Err(ExtendError::TooLarge { increment: bytes });
  };

  unsafe {
    let start = extender.extend(size)?;
    heap.grow(start, size)?;

    debug!(size, heap_size = heap.heap_size(), "extended heap");

    // The new block's header overwrites the old epilogue.
    let block = Block::from_payload(start);
    block.write(size, false);
    block.next().write_header(0, true);

    Ok(coalesce(block))
  }
}

impl<E: HeapExtender> Allocator<E> {
  /// Creates an allocator that has not touched `extender` yet. The heap is
  /// set up by [`init`](Self::init) or by the first allocation.
  pub const fn new(
    extender: E,
    config: HeapConfig,
  ) -> Self {
    Self {
      extender,
      config,
      heap: None,
    }
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn extender(&self) -> &E {
    &self.extender
  }

  /// Region bounds, once initialized.
  pub fn heap(&self) -> Option<&HeapState> {
    self.heap.as_ref()
  }

  /// Writes the prologue and epilogue and extends the heap by one chunk of
  /// free space.
  ///
  /// Calling it again on an initialized allocator does nothing.
  pub fn init(&mut self) -> Result<(), AllocError> {
    if self.heap.is_some() {
      debug!("heap already initialized");
      return Ok(());
    }

    self.heap = Some(fresh_heap(&mut self.extender, self.config)?);
    self.debug_check("init");
    Ok(())
  }

  /// Allocates a block with at least `n` usable bytes.
  ///
  /// Returns `Ok(None)` for `n == 0`. The returned payload is aligned to
  /// [`ALIGNMENT`]. An uninitialized allocator initializes itself first.
  pub fn allocate(
    &mut self,
    n: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if n == 0 {
      return Ok(None);
    }

    let block = self.allocate_block(n)?;
    self.debug_check("allocate");
    Ok(Some(block.payload()))
  }

  /// Like [`allocate`](Self::allocate), with the first `n` bytes zeroed.
  pub fn allocate_zeroed(
    &mut self,
    n: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let payload = self.allocate(n)?;

    if let Some(payload) = payload {
      unsafe { ptr::write_bytes(payload.as_ptr(), 0, n) };
    }

    Ok(payload)
  }

  fn allocate_block(
    &mut self,
    n: usize,
  ) -> Result<Block, AllocError> {
    let Some(asize) = adjusted_size(n) else {
      warn!(requested = n, "request too large for a block");
      return Err(AllocError::out_of_memory(n, ExtendError::TooLarge { increment: n }));
    };

    let config = self.config;
    let heap = match &mut self.heap {
      Some(heap) => heap,
      slot @ None => slot.insert(fresh_heap(&mut self.extender, config)?),
    };

    unsafe {
      if let Some(block) = find_fit(heap, asize) {
        place(block, asize);
        return Ok(block);
      }

      let extend_size = asize.max(config.chunk_size());
      let block = extend_heap(&mut self.extender, heap, extend_size).map_err(|source| {
        warn!(requested = n, asize, %source, "out of memory");
        AllocError::out_of_memory(n, source)
      })?;

      place(block, asize);
      Ok(block)
    }
  }

  /// Frees a block and merges it with any free neighbours.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by this allocator and not released
  /// since.
  pub unsafe fn release(
    &mut self,
    payload: NonNull<u8>,
  ) {
    unsafe {
      let block = Block::from_payload(payload);
      let size = block.size();

      block.write(size, false);
      coalesce(block);
    }

    self.debug_check("release");
  }

  /// Moves an allocation to a block of `n` usable bytes.
  ///
  /// `None` behaves like [`allocate`](Self::allocate); `n == 0` releases the
  /// block and returns `Ok(None)`. Otherwise the first `min(n, old usable
  /// size)` bytes are copied over and the old block is released. If the new
  /// block cannot be allocated the old one is left untouched.
  ///
  /// # Safety
  ///
  /// A `Some` payload must satisfy the requirements of
  /// [`release`](Self::release).
  pub unsafe fn resize(
    &mut self,
    payload: Option<NonNull<u8>>,
    n: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(old) = payload else {
      return self.allocate(n);
    };

    unsafe {
      if n == 0 {
        self.release(old);
        return Ok(None);
      }

      let new = self.allocate_block(n)?;
      let copy = n.min(Block::from_payload(old).usable_size());
      ptr::copy_nonoverlapping(old.as_ptr(), new.payload().as_ptr(), copy);

      self.release(old);
      Ok(Some(new.payload()))
    }
  }

  /// Usable bytes behind `payload`, which may exceed what was requested.
  ///
  /// # Safety
  ///
  /// `payload` must be a live allocation of this allocator.
  pub unsafe fn usable_size(
    &self,
    payload: NonNull<u8>,
  ) -> usize {
    unsafe { Block::from_payload(payload).usable_size() }
  }

  /// Iterates over every block between the sentinels in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.heap.as_ref().map(HeapState::first_block),
      _heap: std::marker::PhantomData,
    }
  }

  /// Walks the whole heap and verifies its structure.
  pub fn check_heap(&self) -> Result<HeapStats, HeapCheckError> {
    let heap = self.heap.as_ref().ok_or(HeapCheckError::Uninitialized)?;

    unsafe {
      let prologue = heap.prologue();
      if prologue.size() != DSIZE
        || !prologue.is_allocated()
        || prologue.header_word() != prologue.footer_word()
      {
        return Err(HeapCheckError::BadPrologue {
          word: prologue.header_word(),
        });
      }

      let mut stats = HeapStats {
        heap_size: heap.heap_size(),
        ..HeapStats::default()
      };
      let mut previous_free: Option<Block> = None;
      let mut block = heap.first_block();

      while !block.is_epilogue() {
        let addr = block.addr();
        if !heap.contains(addr) {
          return Err(HeapCheckError::OutOfBounds { addr });
        }
        if !is_aligned(addr) {
          return Err(HeapCheckError::Misaligned { addr });
        }

        let size = block.size();
        if size < MIN_BLOCK_SIZE || !is_aligned(size) || !heap.contains(addr + size - 1) {
          return Err(HeapCheckError::BadSize { addr, size });
        }

        let header = block.header_word();
        let footer = block.footer_word();
        if header != footer {
          return Err(HeapCheckError::HeaderFooterMismatch { addr, header, footer });
        }

        stats.blocks += 1;
        if block.is_allocated() {
          stats.allocated_bytes += size;
          previous_free = None;
        } else {
          if let Some(first) = previous_free {
            return Err(HeapCheckError::AdjacentFree {
              first: first.addr(),
              second: addr,
            });
          }
          stats.free_blocks += 1;
          stats.free_bytes += size;
          previous_free = Some(block);
        }

        block = block.next();
      }

      let epilogue = heap.epilogue();
      if block != epilogue {
        return Err(HeapCheckError::BreakMismatch {
          walked: block.addr(),
          brk: epilogue.addr(),
        });
      }
      if !epilogue.is_allocated() {
        return Err(HeapCheckError::BadEpilogue {
          addr: epilogue.addr(),
          word: epilogue.header_word(),
        });
      }

      Ok(stats)
    }
  }

  #[cfg(feature = "debug-checks")]
  fn debug_check(
    &self,
    operation: &str,
  ) {
    if let Err(err) = self.check_heap() {
      panic!("heap corrupted after {operation}: {err}");
    }
  }

  #[cfg(not(feature = "debug-checks"))]
  #[inline(always)]
  fn debug_check(
    &self,
    _operation: &str,
  ) {
  }
}

impl<E: HeapExtender + Default> Default for Allocator<E> {
  fn default() -> Self {
    Self::new(E::default(), HeapConfig::default())
  }
}

impl<E: HeapExtender + std::fmt::Debug> std::fmt::Debug for Allocator<E> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("Allocator")
      .field("extender", &self.extender)
      .field("config", &self.config)
      .field("heap", &self.heap)
      .finish()
  }
}

const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);
