use std::{mem, ptr};

use libc::sbrk;
use log::{debug, error};

use crate::align;
use crate::block::{self, BLOCK_ALLOCATED, BLOCK_FREED, Block, META_SIZE, State};
use crate::grower::{BrkGrower, Grower};
use crate::list::FreeList;

/// How many bytes the heap claims from the provider per growth step.
pub const GROWTH_QUANTUM: usize = 0x21000;

pub unsafe fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    unsafe { sbrk(0) }
  );
}

/// A free-list allocator over a single growable heap region.
///
/// The region is carved front to back into header-prefixed blocks;
/// released blocks go onto a doubly-linked free list and are recycled
/// by exact fit first, then by splitting a larger block. The heap only
/// grows, except on [`Heap::reset`].
///
/// Holding raw pointers, the context is neither `Send` nor `Sync`;
/// all access is single-threaded by contract.
pub struct Heap<G: Grower = BrkGrower> {
  grower: G,
  region: *mut u8,
  capacity: usize,
  used: usize,
  free: FreeList,
}

impl Heap<BrkGrower> {
  pub fn new() -> Self {
    Self::with_grower(BrkGrower::new())
  }
}

impl Default for Heap<BrkGrower> {
  fn default() -> Self {
    Self::new()
  }
}

impl<G: Grower> Heap<G> {
  pub fn with_grower(grower: G) -> Self {
    Self {
      grower,
      region: ptr::null_mut(),
      capacity: 0,
      used: 0,
      free: FreeList::new(),
    }
  }

  /// Bytes carved into blocks so far, headers included.
  pub fn used(&self) -> usize {
    self.used
  }

  /// Total bytes claimed from the provider.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  fn remaining(&self) -> usize {
    self.capacity - self.used
  }

  /// Whether a payload pointer lies inside the carved part of the
  /// region. Pointers from anywhere else are rejected before their
  /// header bytes are ever read.
  fn owns(&self, ptr: *mut u8) -> bool {
    if self.region.is_null() {
      return false;
    }
    let base = self.region as usize;
    let addr = ptr as usize;
    addr >= base + META_SIZE && addr < base + self.used
  }

  /// Learns where the heap region starts. The provider is not asked
  /// for any bytes until a block is actually carved.
  unsafe fn prime(&mut self) -> bool {
    if !self.region.is_null() {
      return true;
    }
    match unsafe { self.grower.extend(0) } {
      Some(base) => {
        debug!("heap region starts at {:p}", base);
        self.region = base;
        true
      }
      None => false,
    }
  }

  unsafe fn allocate_fresh(
    &mut self,
    size: usize,
  ) -> *mut Block {
    if self.region.is_null() || size == 0 {
      return ptr::null_mut();
    }
    while self.remaining() < size + META_SIZE {
      if unsafe { self.grower.extend(GROWTH_QUANTUM) }.is_none() {
        debug!("provider exhausted at {} bytes", self.capacity);
        return ptr::null_mut();
      }
      self.capacity += GROWTH_QUANTUM;
      debug!("heap grown to {} bytes", self.capacity);
    }

    unsafe {
      let block = self.region.add(self.used) as *mut Block;
      debug_assert_eq!(block as usize % mem::align_of::<Block>(), 0);
      self.used += META_SIZE + size;

      ptr::write_bytes(block::payload(block), 0, size);
      (*block).size = size;
      (*block).prev = ptr::null_mut();
      (*block).next = ptr::null_mut();
      (*block).tag = BLOCK_ALLOCATED;
      debug!("carved fresh block {:p} ({} bytes)", block, size);
      block
    }
  }

  unsafe fn recycle(
    &mut self,
    size: usize,
  ) -> *mut Block {
    if self.free.is_empty() || size == 0 {
      return ptr::null_mut();
    }
    unsafe {
      // An exact fit always wins, even if a larger block comes first.
      let mut block = self.free.head();
      let mut tail = ptr::null_mut();
      while !block.is_null() {
        if (*block).size == size {
          self.free.unlink(block);
          (*block).tag = BLOCK_ALLOCATED;
          debug!("best fit at {:p}", block);
          return block;
        }
        tail = block;
        block = (*block).next;
      }

      // No exact match; walk back from the tail for the first block
      // large enough to split. A block of exactly size + META_SIZE is
      // skipped: splitting it would leave a zero-byte remainder.
      let mut block = tail;
      while !block.is_null() {
        if (*block).size > size + META_SIZE {
          let leftover = (block as *mut u8).add(META_SIZE + size) as *mut Block;
          (*leftover).size = (*block).size - size - META_SIZE;
          (*leftover).tag = BLOCK_FREED;
          self.free.replace(block, leftover);

          (*block).size = size;
          (*block).prev = ptr::null_mut();
          (*block).next = ptr::null_mut();
          (*block).tag = BLOCK_ALLOCATED;
          debug!("first fit at {:p}, {} bytes left over", block, (*leftover).size);
          return block;
        }
        block = (*block).prev;
      }
    }
    ptr::null_mut()
  }

  /// Allocates `size` bytes and returns the payload pointer, or null
  /// when the provider cannot grow any further. A zero size returns
  /// null without touching the heap.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }
    if !unsafe { self.prime() } {
      return ptr::null_mut();
    }
    let size = align!(size);
    debug!("request for {} bytes, free list: {:?}", size, self.free);

    unsafe {
      let mut block = self.recycle(size);
      if block.is_null() {
        block = self.allocate_fresh(size);
      }
      if block.is_null() {
        return ptr::null_mut();
      }
      block::payload(block)
    }
  }

  /// Releases a block back to the heap. A null pointer is a no-op;
  /// double frees and pointers this heap never handed out are
  /// reported and otherwise ignored.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }
    if !self.owns(ptr) {
      error!("pointer {:p} was not allocated by this heap", ptr);
      return;
    }
    unsafe {
      let block = block::from_payload(ptr);
      match (*block).state() {
        State::Freed => {
          error!("block {:p} has already been freed", ptr);
          return;
        }
        State::Unknown => {
          error!("pointer {:p} was not allocated by this heap", ptr);
          return;
        }
        State::Allocated => {}
      }

      (*block).tag = BLOCK_FREED;
      if !self.free.coalesce(block) {
        self.free.append(block);
      }
      debug!("free list after release: {:?}", self.free);
    }
  }

  /// Allocates room for `count` elements of `size` bytes each and
  /// zeroes the whole payload. The product is not checked for
  /// overflow, as with `calloc(3)`.
  pub unsafe fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    let total = count.wrapping_mul(size);
    unsafe {
      let ptr = self.allocate(total);
      if ptr.is_null() {
        return ptr;
      }
      let block = block::from_payload(ptr);
      ptr::write_bytes(ptr, 0, (*block).size);
      ptr
    }
  }

  /// Resizes a block. A null pointer behaves as [`Heap::allocate`], a
  /// zero size as [`Heap::deallocate`]. When the block already has the
  /// requested size the same pointer comes back untouched; otherwise
  /// the contents move to a new block and the old one is released. On
  /// a shrink only the leading `size` bytes survive; on growth the new
  /// tail is whatever the new block provides.
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if ptr.is_null() {
      return unsafe { self.allocate(size) };
    }
    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return ptr::null_mut();
    }
    if !self.owns(ptr) {
      error!("pointer {:p} was not allocated by this heap", ptr);
      return ptr::null_mut();
    }
    unsafe {
      let block = block::from_payload(ptr);
      let old_size = (*block).size;
      if old_size == align!(size) {
        return ptr;
      }

      let new_ptr = self.allocate(size);
      if new_ptr.is_null() {
        return ptr::null_mut();
      }
      let copied = if old_size < size { old_size } else { size };
      ptr::copy_nonoverlapping(ptr, new_ptr, copied);
      self.deallocate(ptr);
      new_ptr
    }
  }

  /// [`Heap::reallocate`] for an array of `count` elements of `size`
  /// bytes each. The product is not checked for overflow.
  pub unsafe fn reallocate_array(
    &mut self,
    ptr: *mut u8,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.reallocate(ptr, count.wrapping_mul(size)) }
  }

  /// Hands the whole region back to the provider and clears all state,
  /// as if nothing had ever been allocated. Every outstanding pointer
  /// is invalidated. Idempotent.
  pub unsafe fn reset(&mut self) {
    if self.region.is_null() {
      return;
    }
    debug!("releasing heap region at {:p}", self.region);
    unsafe {
      self.grower.release(self.region);
    }
    self.region = ptr::null_mut();
    self.capacity = 0;
    self.used = 0;
    self.free = FreeList::new();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Contiguous in-memory provider. Unit tests must not move the real
  /// program break while the test harness allocates through the
  /// system allocator, so the heap grows into a plain buffer instead.
  struct ArenaGrower {
    storage: Vec<u64>,
    claimed: usize,
  }

  impl ArenaGrower {
    fn new(quanta: usize) -> Self {
      Self {
        storage: vec![0u64; quanta * GROWTH_QUANTUM / mem::size_of::<u64>()],
        claimed: 0,
      }
    }

    fn limit(&self) -> usize {
      self.storage.len() * mem::size_of::<u64>()
    }
  }

  impl Grower for ArenaGrower {
    unsafe fn extend(
      &mut self,
      bytes: usize,
    ) -> Option<*mut u8> {
      if self.claimed + bytes > self.limit() {
        return None;
      }
      let previous = unsafe { self.storage.as_mut_ptr().cast::<u8>().add(self.claimed) };
      self.claimed += bytes;
      Some(previous)
    }

    unsafe fn release(
      &mut self,
      to: *mut u8,
    ) {
      self.claimed = to as usize - self.storage.as_ptr() as usize;
    }
  }

  fn heap(quanta: usize) -> Heap<ArenaGrower> {
    Heap::with_grower(ArenaGrower::new(quanta))
  }

  #[test]
  fn zero_size_allocation_is_a_no_op() {
    let mut heap = heap(1);

    unsafe {
      assert!(heap.allocate(0).is_null());
    }
    assert_eq!(heap.used(), 0);
    assert_eq!(heap.capacity(), 0);
  }

  #[test]
  fn allocation_sets_up_the_header() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(24);
      assert!(!ptr.is_null());

      let block = block::from_payload(ptr);
      assert_eq!((*block).state(), State::Allocated);
      assert_eq!((*block).size, 24);
      assert!((*block).next.is_null() && (*block).prev.is_null());

      // Requests are rounded up to the word grain.
      let odd = heap.allocate(17);
      assert_eq!((*block::from_payload(odd)).size, 24);
    }
    assert_eq!(heap.used(), 2 * (META_SIZE + 24));
  }

  #[test]
  fn fresh_payloads_are_zeroed() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(64);
      let payload = std::slice::from_raw_parts(ptr, 64);
      assert!(payload.iter().all(|&byte| byte == 0));
    }
  }

  #[test]
  fn release_marks_the_block_freed() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(32);
      heap.deallocate(ptr);
      assert_eq!((*block::from_payload(ptr)).state(), State::Freed);
    }
  }

  #[test]
  fn releasing_null_is_a_no_op() {
    let mut heap = heap(1);

    unsafe {
      heap.deallocate(ptr::null_mut());
    }
    assert_eq!(heap.used(), 0);
  }

  #[test]
  fn double_free_changes_nothing() {
    let mut heap = heap(1);

    unsafe {
      let first = heap.allocate(32);
      let second = heap.allocate(32);
      heap.deallocate(first);

      let head = heap.free.head();
      heap.deallocate(first);

      assert_eq!((*block::from_payload(first)).state(), State::Freed);
      assert_eq!((*block::from_payload(second)).state(), State::Allocated);
      assert_eq!(heap.free.head(), head);
      assert!((*head).next.is_null());
    }
  }

  #[test]
  fn foreign_pointers_are_rejected() {
    let mut heap = heap(1);
    let mut outside = [0u8; 64];

    unsafe {
      heap.deallocate(outside.as_mut_ptr());
      assert_eq!(heap.used(), 0);

      // In a primed heap, pointers past the carved frontier are just
      // as foreign.
      let ptr = heap.allocate(16);
      let used = heap.used();
      heap.deallocate(ptr.add(4096));
      assert_eq!(heap.used(), used);
      assert_eq!((*block::from_payload(ptr)).state(), State::Allocated);
    }
  }

  #[test]
  fn exact_fit_recycling_returns_the_same_address() {
    let mut heap = heap(1);
    let text: &[u8; 17] = b"my memory block!!";

    unsafe {
      let ptr = heap.allocate(text.len());
      assert!(!ptr.is_null());
      assert_eq!((*block::from_payload(ptr)).size, align!(text.len()));

      ptr::copy_nonoverlapping(text.as_ptr(), ptr, text.len());
      assert_eq!(std::slice::from_raw_parts(ptr, text.len()), text);

      heap.deallocate(ptr);

      let again = heap.allocate(text.len());
      assert_eq!(again, ptr);
      assert_eq!((*block::from_payload(again)).state(), State::Allocated);
    }
  }

  #[test]
  fn exact_fit_on_the_head_keeps_the_rest_of_the_list() {
    let mut heap = heap(1);

    unsafe {
      let first = heap.allocate(16);
      let _barrier = heap.allocate(16);
      let second = heap.allocate(48);

      // Freed blocks are not adjacent, so both sit on the list.
      heap.deallocate(first);
      heap.deallocate(second);

      let recycled = heap.allocate(16);
      assert_eq!(recycled, first);
      assert_eq!(heap.free.head(), block::from_payload(second));
    }
  }

  #[test]
  fn first_fit_splits_a_larger_block() {
    let mut heap = heap(1);

    unsafe {
      let big = heap.allocate(128);
      let _barrier = heap.allocate(16);
      heap.deallocate(big);

      // The front of the freed region is reused...
      let small = heap.allocate(32);
      assert_eq!(small, big);
      assert_eq!((*block::from_payload(small)).size, 32);

      // ...and the leftover is a free block of the reduced size.
      let leftover = heap.free.head();
      assert_eq!((*leftover).size, 128 - 32 - META_SIZE);
      assert_eq!((*leftover).state(), State::Freed);
      assert_eq!(leftover as *mut u8, big.add(32));

      let rest = heap.allocate(128 - 32 - META_SIZE);
      assert_eq!(block::from_payload(rest), leftover);
    }
  }

  #[test]
  fn a_block_barely_too_small_to_split_is_skipped() {
    let mut heap = heap(1);

    unsafe {
      let block = heap.allocate(32 + META_SIZE);
      let _barrier = heap.allocate(16);
      heap.deallocate(block);

      // Splitting would leave a zero-byte remainder, so the request
      // is served from fresh memory instead.
      let fresh = heap.allocate(32);
      assert_ne!(fresh, block);
      assert_eq!((*heap.free.head()).size, 32 + META_SIZE);
    }
  }

  #[test]
  fn adjacent_blocks_coalesce_released_low_to_high() {
    let mut heap = heap(1);

    unsafe {
      let low = heap.allocate(32);
      let high = heap.allocate(32);
      let _barrier = heap.allocate(16);

      heap.deallocate(low);
      heap.deallocate(high);

      let merged = heap.free.head();
      assert_eq!(merged, block::from_payload(low));
      assert!((*merged).next.is_null());
      assert_eq!((*merged).size, 32 + 32 + META_SIZE);

      // The merged block is reachable by its combined size and starts
      // at the lower of the two addresses.
      let ptr = heap.allocate(32 + 32 + META_SIZE);
      assert_eq!(ptr, low);
    }
  }

  #[test]
  fn adjacent_blocks_coalesce_released_high_to_low() {
    let mut heap = heap(1);

    unsafe {
      let low = heap.allocate(32);
      let high = heap.allocate(32);
      let _barrier = heap.allocate(16);

      heap.deallocate(high);
      heap.deallocate(low);

      let merged = heap.free.head();
      assert_eq!(merged, block::from_payload(low));
      assert_eq!((*merged).size, 32 + 32 + META_SIZE);

      // The absorbed header was erased.
      assert_eq!((*block::from_payload(high)).state(), State::Unknown);

      let ptr = heap.allocate(32 + 32 + META_SIZE);
      assert_eq!(ptr, low);
    }
  }

  #[test]
  fn reallocate_to_the_same_size_returns_the_same_pointer() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(24);
      assert_eq!(heap.reallocate(ptr, 24), ptr);
      // Same block after rounding, too.
      assert_eq!(heap.reallocate(ptr, 17), ptr);
      assert_eq!(heap.used(), META_SIZE + 24);
    }
  }

  #[test]
  fn reallocate_growth_preserves_the_payload() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(24);
      for i in 0..24 {
        ptr.add(i).write(i as u8);
      }

      let grown = heap.reallocate(ptr, 64);
      assert!(!grown.is_null());
      assert_ne!(grown, ptr);
      for i in 0..24 {
        assert_eq!(grown.add(i).read(), i as u8);
      }
      assert_eq!((*block::from_payload(ptr)).state(), State::Freed);
    }
  }

  #[test]
  fn reallocate_shrink_keeps_the_leading_bytes() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(64);
      for i in 0..64 {
        ptr.add(i).write(i as u8);
      }

      let shrunk = heap.reallocate(ptr, 24);
      assert!(!shrunk.is_null());
      for i in 0..24 {
        assert_eq!(shrunk.add(i).read(), i as u8);
      }
      assert_eq!((*block::from_payload(ptr)).state(), State::Freed);
    }
  }

  #[test]
  fn reallocate_null_and_zero_edges() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.reallocate(ptr::null_mut(), 40);
      assert!(!ptr.is_null());
      assert_eq!((*block::from_payload(ptr)).size, 40);

      assert!(heap.reallocate(ptr, 0).is_null());
      assert_eq!((*block::from_payload(ptr)).state(), State::Freed);
    }
  }

  #[test]
  fn allocate_zeroed_clears_recycled_memory() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.allocate(40);
      ptr::write_bytes(ptr, 0xAB, 40);
      heap.deallocate(ptr);

      let zeroed = heap.allocate_zeroed(5, 8);
      assert_eq!(zeroed, ptr);
      let payload = std::slice::from_raw_parts(zeroed, 40);
      assert!(payload.iter().all(|&byte| byte == 0));
    }
  }

  #[test]
  fn reallocate_array_scales_by_the_element_size() {
    let mut heap = heap(1);

    unsafe {
      let ptr = heap.reallocate_array(ptr::null_mut(), 6, 8);
      assert_eq!((*block::from_payload(ptr)).size, 48);

      let grown = heap.reallocate_array(ptr, 12, 8);
      assert_eq!((*block::from_payload(grown)).size, 96);
    }
  }

  #[test]
  fn reset_restores_the_pristine_state() {
    let mut heap = heap(2);

    unsafe {
      let first = heap.allocate(16);
      let second = heap.allocate(64);
      heap.deallocate(first);
      let _ = heap.reallocate(second, 128);

      heap.reset();
      assert_eq!(heap.used(), 0);
      assert_eq!(heap.capacity(), 0);
      assert!(heap.free.is_empty());

      // The next allocation behaves as if nothing had ever happened.
      let again = heap.allocate(16);
      assert_eq!(again, first);

      heap.reset();
      heap.reset();
      assert_eq!(heap.capacity(), 0);
    }
  }

  #[test]
  fn the_heap_grows_in_fixed_quanta() {
    let mut heap = heap(4);

    unsafe {
      let ptr = heap.allocate(3 * GROWTH_QUANTUM);
      assert!(!ptr.is_null());
    }
    assert_eq!(heap.capacity(), 4 * GROWTH_QUANTUM);
    assert_eq!(heap.used(), META_SIZE + 3 * GROWTH_QUANTUM);
  }

  #[test]
  fn provider_exhaustion_yields_null_and_is_recoverable() {
    let mut heap = heap(2);

    unsafe {
      assert!(heap.allocate(3 * GROWTH_QUANTUM).is_null());
      assert_eq!(heap.used(), 0);
      // Quanta claimed before the failure stay claimed.
      assert_eq!(heap.capacity(), 2 * GROWTH_QUANTUM);

      // A smaller request still succeeds from the retained capacity.
      assert!(!heap.allocate(64).is_null());
    }
  }
}
