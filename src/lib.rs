//! # rheap - An Implicit Free-List Heap Allocator
//!
//! This crate provides a first-fit **implicit free-list** allocator that
//! manages one contiguous, growable heap region, grown `sbrk`-style on demand.
//!
//! ## Overview
//!
//! Every block carries its own metadata. There is no separate free list: the
//! allocator walks the heap block by block, using each block's size to find
//! the next one.
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬──────────┬────────────┬────────────┬────────────┬─────────┐
//!   │ pad │ prologue │  block A   │  block B   │  block C   │ epilogue│
//!   │     │ (8, a)   │ (24, a)    │ (48, free) │ (4024, a)  │ (0, a)  │
//!   └─────┴──────────┴────────────┴────────────┴────────────┴─────────┘
//!   ▲                                                                 ▲
//!   heap_lo                                                       break
//!
//!   Each block:
//!   ┌────────┬──────────────────────────────────┬────────┐
//!   │ header │            payload               │ footer │
//!   │ size|a │                                  │ size|a │
//!   └────────┴──────────────────────────────────┴────────┘
//!            ▲
//!            └── Pointer returned to user (8-byte aligned)
//! ```
//!
//! The footer mirrors the header so a block can find its predecessor: the
//! word right before a header is the previous block's footer. The prologue
//! and epilogue are permanently allocated, so merging never has to check for
//! the edges of the heap.
//!
//! ## Crate Structure
//!
//! ```text
//!   rheap
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Header/footer codec and block navigation
//!   ├── extend     - HeapExtender trait, Sbrk and MemLib
//!   ├── heap       - HeapState: region bounds and sentinels
//!   ├── allocator  - Allocator: allocate, release, resize, check_heap
//!   ├── global     - SingleThreadedHeap (GlobalAlloc)
//!   ├── config     - HeapConfig
//!   └── error      - AllocError, ExtendError, HeapCheckError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rheap::{Allocator, HeapConfig, MemLib};
//!
//! let mut allocator = Allocator::new(MemLib::new(1 << 20), HeapConfig::default());
//! allocator.init().unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap().unwrap();
//! assert_eq!(ptr.as_ptr() as usize % rheap::ALIGNMENT, 0);
//!
//! let ptr = unsafe { allocator.resize(Some(ptr), 400) }.unwrap().unwrap();
//! unsafe { allocator.release(ptr) };
//!
//! assert_eq!(allocator.check_heap().unwrap().free_blocks, 1);
//! ```
//!
//! ## How It Works
//!
//! - **allocate** rounds the request up to a multiple of 8 plus 8 bytes of
//!   metadata (16 bytes at least), takes the first free block that is large
//!   enough, and splits it when the remainder can stand on its own. When
//!   nothing fits, the heap grows by `max(chunk_size, block size)`.
//! - **release** marks the block free and immediately merges it with free
//!   neighbours, so two free blocks are never adjacent.
//! - **resize** allocates a new block, copies, and only then releases the old
//!   one; a failed resize leaves the original allocation intact.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Linear fits**: Finding a block walks every block before it
//! - **No shrinking**: The heap never returns memory to its extender
//! - **Trusted callers**: Releasing a foreign or already released pointer is
//!   undefined behavior
//!
//! ## Safety
//!
//! Allocation itself is safe once the [`HeapExtender`] upholds its contract.
//! Releasing and resizing take raw payload pointers and are `unsafe`.

pub mod align;
mod allocator;
mod block;
mod config;
mod error;
mod extend;
mod global;
mod heap;

pub use allocator::{Allocator, BlockInfo, Blocks, HeapStats};
pub use block::{ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, WSIZE};
pub use config::HeapConfig;
pub use error::{AllocError, ExtendError, HeapCheckError};
pub use extend::{HeapExtender, MemLib, Sbrk};
pub use global::SingleThreadedHeap;
pub use heap::HeapState;
