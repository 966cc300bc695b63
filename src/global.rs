//! `GlobalAlloc` front end for single-threaded programs.
//!
//! ```ignore
//! use rheap::{HeapConfig, Sbrk, SingleThreadedHeap};
//!
//! #[global_allocator]
//! static HEAP: SingleThreadedHeap<Sbrk> = SingleThreadedHeap::new(Sbrk::new(), HeapConfig::DEFAULT);
//! ```

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};

use crate::{ALIGNMENT, allocator::Allocator, config::HeapConfig, extend::HeapExtender};

/// An [`Allocator`] usable as `#[global_allocator]`.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. The `Sync` implementation exists
/// because global allocators require it; allocating from two threads at
/// once is undefined behavior. A `tracing` subscriber installed in such a
/// program must not allocate through this heap while it logs.
pub struct SingleThreadedHeap<E: HeapExtender> {
  inner: UnsafeCell<Allocator<E>>,
}

impl<E: HeapExtender> SingleThreadedHeap<E> {
  pub const fn new(
    extender: E,
    config: HeapConfig,
  ) -> Self {
    Self {
      inner: UnsafeCell::new(Allocator::new(extender, config)),
    }
  }

  /// The wrapped allocator.
  ///
  /// # Safety
  ///
  /// No other reference to the allocator may be live, and no allocation may
  /// happen through `self` while the returned reference is in use.
  #[allow(clippy::mut_from_ref)]
  pub unsafe fn allocator(&self) -> &mut Allocator<E> {
    unsafe { &mut *self.inner.get() }
  }
}

// SAFETY: the `UnsafeCell<Allocator<E>>` is only ever reached from the one
// thread the program runs on; `#[global_allocator]` statics must be `Sync`.
unsafe impl<E: HeapExtender> Sync for SingleThreadedHeap<E> {}

unsafe impl<E: HeapExtender> GlobalAlloc for SingleThreadedHeap<E> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    match unsafe { self.allocator() }.allocate(layout.size()) {
      Ok(Some(payload)) => payload.as_ptr(),
      _ => ptr::null_mut(),
    }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    match unsafe { self.allocator() }.allocate_zeroed(layout.size()) {
      Ok(Some(payload)) => payload.as_ptr(),
      _ => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(
    &self,
    address: *mut u8,
    _layout: Layout,
  ) {
    if let Some(payload) = NonNull::new(address) {
      unsafe { self.allocator().release(payload) };
    }
  }

  unsafe fn realloc(
    &self,
    address: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    match unsafe { self.allocator().resize(NonNull::new(address), new_size) } {
      Ok(Some(payload)) => payload.as_ptr(),
      _ => ptr::null_mut(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::extend::MemLib;

  fn heap() -> Box<SingleThreadedHeap<MemLib>> {
    Box::new(SingleThreadedHeap::new(MemLib::new(1 << 16), HeapConfig::DEFAULT))
  }

  #[test]
  fn test_basic_allocation() {
    let heap = heap();

    unsafe {
      let ptr1 = heap.alloc(Layout::from_size_align(64, 8).unwrap());
      assert!(!ptr1.is_null());

      let ptr2 = heap.alloc(Layout::from_size_align(64, 8).unwrap());
      assert!(!ptr2.is_null());
      assert_ne!(ptr1, ptr2);

      heap.dealloc(ptr1, Layout::from_size_align(64, 8).unwrap());
      heap.dealloc(ptr2, Layout::from_size_align(64, 8).unwrap());

      assert_eq!(heap.allocator().check_heap().unwrap().allocated_bytes, 0);
    }
  }

  #[test]
  fn test_over_aligned_layout_is_refused() {
    let heap = heap();

    unsafe {
      let ptr = heap.alloc(Layout::from_size_align(32, 64).unwrap());
      assert!(ptr.is_null());
      assert!(heap.allocator().heap().is_none());
    }
  }

  #[test]
  fn test_alloc_zeroed_and_realloc() {
    let heap = heap();
    let layout = Layout::array::<u16>(8).unwrap();

    unsafe {
      let first = heap.alloc_zeroed(layout) as *mut u16;
      assert!(!first.is_null());
      for i in 0..8 {
        assert_eq!(*first.add(i), 0);
        *first.add(i) = (i + 1) as u16;
      }

      let grown = heap.realloc(first as *mut u8, layout, 64) as *mut u16;
      assert!(!grown.is_null());
      for i in 0..8 {
        assert_eq!(*grown.add(i), (i + 1) as u16);
      }

      heap.dealloc(grown as *mut u8, Layout::from_size_align(64, 2).unwrap());
      heap.allocator().check_heap().unwrap();
    }
  }

  #[test]
  fn test_out_of_memory() {
    let heap = heap();

    unsafe {
      let ptr = heap.alloc(Layout::from_size_align(1 << 20, 8).unwrap());
      assert!(ptr.is_null());

      let ptr = heap.alloc(Layout::from_size_align(32, 8).unwrap());
      assert!(!ptr.is_null());
    }
  }
}
