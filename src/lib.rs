//! # wfalloc - A Worst-Fit Heap Allocator
//!
//! This crate provides a user-space heap that hands out variably-sized blocks
//! from a growable region of memory, either an in-process arena or the
//! process's data segment grown with `sbrk`.
//!
//! ## Overview
//!
//! Every block, free or allocated, starts with a header and is linked into a
//! single doubly-linked list kept in address order:
//!
//! ```text
//!   Heap Memory:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ ┌────┬──────┐ ┌────┬────────────────┐ ┌────┬─────┐                   │
//!   │ │ H  │  A1  │ │ H  │      free      │ │ H  │ A3  │  (not yet grown)  │
//!   │ └────┴──────┘ └────┴────────────────┘ └────┴─────┘                   │
//!   │   ▲    ⇄        ⇄                       ⇄   ▲                        │
//!   │  head                                      tail                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Allocation** scans the whole list for the *largest* free block
//!   (worst fit, earliest block on ties). If it is big enough it is taken,
//!   and split when the remainder can hold another header plus at least one
//!   byte. Otherwise the heap grows by one header plus the requested bytes
//!   and a new block is appended after the tail.
//! - **Release** marks the block free, merges it with a free successor and
//!   a free predecessor, then sweeps the list once so no two neighbouring
//!   blocks are ever both free.
//! - Memory is never given back to the source.
//!
//! ## Crate Structure
//!
//! ```text
//!   wfalloc
//!   ├── block      - Header layout, BlockAddr, BlockState, Block
//!   ├── directory  - The address-ordered block list (internal)
//!   ├── heap       - Heap: allocate, release, payload access
//!   ├── dump       - Dump iterator, meminfo text, Usage
//!   ├── source     - HeapSource trait and the VecSource arena
//!   ├── sbrk       - SbrkSource over the program break
//!   └── error      - HeapError, GrowError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use wfalloc::Heap;
//!
//! let mut heap = Heap::new();
//!
//! let a = heap.allocate(4).unwrap();
//! let b = heap.allocate(128).unwrap();
//! heap.payload_mut(b).unwrap().fill(0xAB);
//!
//! heap.release(a).unwrap();
//! heap.release(b).unwrap();
//!
//! // Both blocks collapsed into one free block.
//! assert_eq!(heap.dump().count(), 1);
//! print!("{}", heap.dump());
//! ```
//!
//! ## Addresses
//!
//! A [`BlockAddr`] is the byte offset of a block header from the start of
//! the heap; the payload begins [`HEADER_BYTES`] later. Headers are read and
//! written through explicit accessors, never by casting pointers, and
//! payloads are only reachable through [`Heap::payload`] and
//! [`Heap::payload_mut`], so safe code cannot corrupt the directory.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the heap in a mutex to share it
//! - **No alignment** beyond what the header layout gives
//! - **O(n) allocation**: worst fit scans every block
//! - **No shrinking**: memory is never returned to the operating system

mod block;
mod directory;
mod dump;
mod error;
mod heap;
mod sbrk;
mod source;

pub use block::{Block, BlockAddr, BlockState, HEADER_BYTES};
pub use dump::{Dump, Usage};
pub use error::{GrowError, HeapError};
pub use heap::Heap;
pub use sbrk::{SbrkSource, program_break};
pub use source::{HeapSource, VecSource};
