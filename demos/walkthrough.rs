use std::{io::Read, ptr::NonNull};

use rheap::{Allocator, HeapConfig, Sbrk};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` while the program break moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

fn print_blocks(allocator: &Allocator<Sbrk>) {
  for block in allocator.blocks() {
    println!(
      "    {:?}  size = {:>6}  {}",
      block.payload,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
}

fn allocate(
  allocator: &mut Allocator<Sbrk>,
  n: usize,
) -> Option<NonNull<u8>> {
  match allocator.allocate(n) {
    Ok(ptr) => {
      println!("Allocated {} bytes, address = {:?}", n, ptr);
      ptr
    }
    Err(err) => {
      println!("Allocation of {} bytes failed: {}", n, err);
      None
    }
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .with_target(false)
    .init();

  let mut allocator = Allocator::new(Sbrk::new(), HeapConfig::default());

  print_program_break("start");
  if let Err(err) = allocator.init() {
    println!("init failed: {}", err);
    return;
  }
  print_program_break("after init");
  print_blocks(&allocator);
  block_until_enter_pressed();

  // 1) Two small allocations split the initial chunk.
  println!("\n[1] Allocate 100 and 200 bytes");
  let (Some(first), Some(second)) = (allocate(&mut allocator, 100), allocate(&mut allocator, 200)) else {
    return;
  };
  unsafe { std::ptr::write_bytes(first.as_ptr(), 0xAB, 100) };
  print_blocks(&allocator);
  block_until_enter_pressed();

  // 2) Releasing the first block leaves a hole the next small request reuses.
  println!("\n[2] Release the first block, then allocate 16 bytes");
  unsafe { allocator.release(first) };
  let third = allocate(&mut allocator, 16);
  println!(
    "[2] third == first? {}",
    if third == Some(first) {
      "Yes, first fit reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_blocks(&allocator);
  block_until_enter_pressed();

  // 3) Growing an allocation moves it and frees the old block.
  println!("\n[3] Resize the second block to 1000 bytes");
  match unsafe { allocator.resize(Some(second), 1000) } {
    Ok(moved) => println!("[3] moved from {:?} to {:?}", second, moved),
    Err(err) => println!("[3] resize failed: {}", err),
  }
  print_blocks(&allocator);
  block_until_enter_pressed();

  // 4) A request bigger than the free space grows the heap.
  print_program_break("before large alloc");
  println!("\n[4] Allocate 64 KiB");
  allocate(&mut allocator, 64 * 1024);
  print_program_break("after large alloc");
  print_blocks(&allocator);

  match allocator.check_heap() {
    Ok(stats) => println!("\n[5] Heap is consistent: {:?}", stats),
    Err(err) => println!("\n[5] Heap is corrupted: {}", err),
  }

  println!("\n[6] End of example. Process will exit and the OS will reclaim all memory.");
}
