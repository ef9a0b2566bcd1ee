use std::{fmt, ptr};

use log::debug;

use crate::block::{self, Block, META_SIZE, Side, State};

/// Doubly-linked chain of freed blocks, unordered with respect to
/// address and size. Blocks are never copied, only re-linked.
pub struct FreeList {
  head: *mut Block,
}

impl FreeList {
  pub fn new() -> Self {
    Self {
      head: ptr::null_mut(),
    }
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Hangs a block off the tail of the list. Ignores a null block.
  pub unsafe fn append(
    &mut self,
    block: *mut Block,
  ) {
    if block.is_null() {
      return;
    }
    debug!("appending {:p} to the free list", block);
    unsafe {
      if self.head.is_null() {
        self.head = block;
        return;
      }
      let mut tail = self.head;
      while !(*tail).next.is_null() {
        tail = (*tail).next;
      }
      (*tail).next = block;
      (*block).prev = tail;
    }
  }

  /// Detaches a block, repairing its neighbours and the head, and
  /// clears the block's own links.
  pub unsafe fn unlink(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if !(*block).next.is_null() {
        (*(*block).next).prev = (*block).prev;
      }
      if !(*block).prev.is_null() {
        (*(*block).prev).next = (*block).next;
      }
      if self.head == block {
        self.head = (*block).next;
      }
      (*block).next = ptr::null_mut();
      (*block).prev = ptr::null_mut();
    }
  }

  /// Puts `new` into the exact list position `old` occupies,
  /// re-pointing old's neighbours and the head. Old's links are left
  /// for the caller to clear.
  pub unsafe fn replace(
    &mut self,
    old: *mut Block,
    new: *mut Block,
  ) {
    unsafe {
      (*new).next = (*old).next;
      (*new).prev = (*old).prev;
      if !(*new).next.is_null() {
        (*(*new).next).prev = new;
      }
      if !(*new).prev.is_null() {
        (*(*new).prev).next = new;
      } else {
        self.head = new;
      }
    }
  }

  /// Folds a freshly freed block into an adjacent block already on the
  /// list. Scans the whole list and merges with the first neighbour
  /// found, left or right; a block flanked by two free neighbours is
  /// merged with only one of them per call.
  ///
  /// Returns false when the list is empty or no neighbour exists; the
  /// caller appends the block as a standalone entry instead.
  pub unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) -> bool {
    if block.is_null() || self.head.is_null() {
      debug!("nothing to coalesce with");
      return false;
    }
    unsafe {
      let mut neighbour = self.head;
      let mut side = None;
      while !neighbour.is_null() {
        side = block::neighbour_side(block, neighbour);
        if side.is_some() {
          break;
        }
        neighbour = (*neighbour).next;
      }
      let Some(side) = side else {
        debug!("no neighbour found for {:p}", block);
        return false;
      };

      // The absorbed header becomes payload space.
      let merged = (*block).size + (*neighbour).size + META_SIZE;
      match side {
        Side::Right => {
          debug!("merging {:p} with right neighbour {:p}", block, neighbour);
          (*block).size = merged;
          self.replace(neighbour, block);
          ptr::write_bytes(neighbour as *mut u8, 0, META_SIZE);
        }
        Side::Left => {
          debug!("merging {:p} with left neighbour {:p}", block, neighbour);
          (*neighbour).size = merged;
          ptr::write_bytes(block as *mut u8, 0, META_SIZE);
        }
      }
    }
    true
  }
}

impl fmt::Debug for FreeList {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    if self.head.is_null() {
      return write!(f, "<empty>");
    }
    let mut block = self.head;
    while !block.is_null() {
      unsafe {
        let symbol = match (*block).state() {
          State::Allocated => 'A',
          State::Freed => 'U',
          State::Unknown => '?',
        };
        write!(f, "{}[{:p}({})]", symbol, block::payload(block), (*block).size)?;
        block = (*block).next;
      }
      if !block.is_null() {
        write!(f, " -> ")?;
      }
    }
    Ok(())
  }
}
