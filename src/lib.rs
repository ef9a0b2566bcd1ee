//! # rmalloc - A Free-List Memory Allocator Library
//!
//! This crate provides a classic **free-list allocator**, a drop-in
//! replacement for the `malloc` family, that manages a single growable
//! heap region obtained through the `sbrk` system call.
//!
//! ## Overview
//!
//! The heap is carved front to back into header-prefixed blocks. Released
//! blocks are kept on a doubly-linked free list and handed out again:
//!
//! ```text
//!   Free-List Allocator Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP REGION                                  │
//!   │                                                                      │
//!   │   ┌────┬────┬────┬────┬────┬──────────────────────────────────────┐  │
//!   │   │ A1 │ F2 │ A3 │ F4 │ A5 │          Unformatted Space           │  │
//!   │   └────┴─┬──┴────┴─▲┬─┴────┴──────────────────────────────────────┘  │
//!   │          │         ││                                           ▲    │
//!   │          └─────────┘│          free list: F2 ⇄ F4               │    │
//!   │          ◄──────────┘                                       Program  │
//!   │                                                              Break   │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   An allocation is served from the free list when a released block
//!   fits (exact fit first, then by splitting a larger block), and only
//!   otherwise by carving fresh space at the frontier.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Word-grain rounding macro (align!)
//!   ├── block      - Block metadata header (internal)
//!   ├── list       - Doubly-linked free list (internal)
//!   ├── grower     - Raw heap provider (Grower trait, BrkGrower)
//!   └── heap       - Heap allocator context and public API
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rmalloc::Heap;
//!
//! fn main() {
//!     let mut heap = Heap::new();
//!
//!     unsafe {
//!         // Allocate 64 bytes.
//!         let ptr = heap.allocate(64);
//!
//!         // Use the memory.
//!         ptr.write(42);
//!         println!("Value: {}", ptr.read());
//!
//!         // Release it; the block goes onto the free list and the
//!         // next fitting allocation gets it back.
//!         heap.deallocate(ptr);
//!     }
//! }
//! ```
//!
//! ## How It Works
//!
//! The default provider extends the program's data segment with `sbrk(2)`:
//!
//! ```text
//!   Program Memory Layout:
//!
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │         │           │
//!                │         ▼           │
//!                │                     │
//!                │         ▲           │
//!                │         │           │
//!                │       Heap          │ ↑ grows up (sbrk)
//!                ├─────────────────────┤ ← Program Break
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized       │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! The heap grows in fixed quanta of [`GROWTH_QUANTUM`] bytes and never
//! shrinks, except on a full [`Heap::reset`]. Every chunk carries metadata:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ prev: null/ptr  │  │  │                          │  │
//!   │  │ next: null/ptr  │  │  │     N bytes usable       │  │
//!   │  │ tag:  A / F     │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      32 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! `prev`/`next` link the block into the free list while it is released;
//! the `tag` word distinguishes allocated from freed blocks and lets
//! double frees and foreign pointers be detected and reported instead of
//! corrupting the heap.
//!
//! ## Diagnostics
//!
//! Allocator-internal events (growth steps, fit decisions, free-list
//! snapshots) go to the [`log`] crate at debug level; double-free and
//! invalid-free reports use the error level. Wire up any `log` consumer
//! (the bundled demo uses `env_logger`) or compile the levels out with
//! `log`'s release features.
//!
//! ## Features
//!
//! - **Block recycling**: exact fits win; larger blocks are split and the
//!   remainder stays allocatable
//! - **Coalescing**: a released block merges with a free neighbour,
//!   keeping the list free of adjacent pairs
//! - **Pluggable provider**: anything implementing [`Grower`] can back a
//!   heap, e.g. a fixed buffer for tests
//! - **Misuse reporting**: double frees and foreign pointers are logged
//!   and ignored, never fatal
//!
//! ## Limitations
//!
//! - **Single-threaded only**: the context holds raw pointers and is
//!   neither `Send` nor `Sync`; there is no locking
//! - **Linear search**: both fit passes walk the free list, O(n)
//! - **Word-grain sizes**: requests are rounded up to the machine word so
//!   headers stay naturally aligned; no stronger alignment is provided
//! - **The heap only grows**: releasing blocks never returns memory to
//!   the OS; only [`Heap::reset`] does
//! - **Unchecked products**: `allocate_zeroed` and `reallocate_array` do
//!   not check `count * size` for overflow, as with `calloc(3)`
//! - **Unix-only default**: [`BrkGrower`] requires `libc` and `sbrk`
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory
//! management. All allocation and deallocation operations require
//! `unsafe` blocks.

pub mod align;
mod block;
mod grower;
mod heap;
mod list;

pub use grower::{BrkGrower, Grower};
pub use heap::{GROWTH_QUANTUM, Heap, print_alloc};
