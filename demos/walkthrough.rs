use std::{io::Read, ptr};

use libc::sbrk;
use rmalloc::{Heap, print_alloc};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how the program break moves.
///
/// Run with `RUST_LOG=debug` to watch the allocator's own trace of fit
/// decisions and free-list states between the steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  env_logger::init();

  // The allocator context. It tracks:
  // - the base of the region claimed from the OS
  // - how much of it is carved into blocks
  // - the free list of released blocks
  let mut heap = Heap::new();

  unsafe {
    // Initial heap state
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 64 bytes. The first request claims a whole growth
    //    quantum from the OS, so the break jumps well past 64 bytes.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(64);
    println!("\n[1] Allocate 64 bytes");
    print_alloc(64, first_block);

    // Write something into the allocated memory to show it's usable.
    ptr::write_bytes(first_block, 0xAB, 64);
    println!("[1] Filled the block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate a second block. It is carved right behind the first
    //    one; the break does not move again.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(32);
    println!("\n[2] Allocate 32 bytes (carved from the same quantum)");
    print_alloc(32, second_block);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Release the first block and allocate 64 bytes again. The freed
    //    block is an exact fit, so the same address comes back.
    // --------------------------------------------------------------------
    heap.deallocate(first_block);
    println!("\n[3] Released the first block");

    let recycled = heap.allocate(64);
    print_alloc(64, recycled);
    println!(
      "[3] recycled == first_block? {}",
      if recycled == first_block {
        "Yes, exact fit recycled the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Release it again and ask for less. The block is split: the
    //    front is returned, the remainder stays on the free list.
    // --------------------------------------------------------------------
    heap.deallocate(recycled);
    let small = heap.allocate(16);
    println!("\n[4] Allocate 16 bytes out of the freed 64-byte block");
    print_alloc(16, small);
    println!(
      "[4] small == first_block? {}",
      if small == first_block { "Yes, split in place" } else { "No" }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Release the front part again. The split leftover is still on
    //    the free list as its address neighbour, so the two merge back
    //    into one block.
    // --------------------------------------------------------------------
    heap.deallocate(small);
    println!("\n[5] Released the front part; it coalesced with the leftover");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Grow the second block with reallocate. The contents move into
    //    a fresh block; the old one joins the free list.
    // --------------------------------------------------------------------
    ptr::write_bytes(second_block, 0x5A, 32);
    let grown = heap.reallocate(second_block, 128);
    println!("\n[6] Reallocate the 32-byte block to 128 bytes");
    print_alloc(128, grown);
    println!(
      "[6] first byte survived the move: 0x{:X}",
      grown.read()
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) Allocate a block larger than one growth quantum and watch the
    //    break move in fixed steps.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = heap.allocate(256 * 1024);
    println!("\n[7] Allocate a 256 KiB block");
    print_alloc(256 * 1024, big_block);

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 8) Reset. The whole region goes back to the OS and the break
    //    returns to where it started.
    // --------------------------------------------------------------------
    heap.reset();
    println!("\n[8] Heap reset");
    print_program_break("after reset");

    println!("\n[8] End of walkthrough.");
  }
}
