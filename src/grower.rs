use libc::{c_void, intptr_t};
use log::debug;

/// Source of raw heap memory.
///
/// Implementations hand out one contiguous, growable region: each
/// successful `extend` must return the previous boundary, directly
/// after the bytes handed out by the call before it.
pub trait Grower {
  /// Pushes the boundary out by `bytes` and returns the previous
  /// boundary, i.e. the start of the fresh region. `extend(0)` reads
  /// the current boundary without claiming anything. Returns `None`
  /// when the provider cannot grow further.
  unsafe fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<*mut u8>;

  /// Pulls the boundary back to `to`, releasing everything above it.
  /// Only used by a full heap reset.
  unsafe fn release(
    &mut self,
    to: *mut u8,
  );
}

/// Grows the heap by moving the program break with `sbrk(2)`.
///
/// Contiguity holds as long as nothing else in the process moves the
/// break between calls.
#[derive(Default)]
pub struct BrkGrower;

impl BrkGrower {
  pub fn new() -> Self {
    Self
  }
}

impl Grower for BrkGrower {
  unsafe fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<*mut u8> {
    let address = unsafe { libc::sbrk(bytes as intptr_t) };

    if address == usize::MAX as *mut c_void {
      return None;
    }
    debug!("moved program break by {} bytes from {:p}", bytes, address);
    Some(address as *mut u8)
  }

  unsafe fn release(
    &mut self,
    to: *mut u8,
  ) {
    debug!("setting program break back to {:p}", to);
    unsafe {
      libc::brk(to as *mut c_void);
    }
  }
}
