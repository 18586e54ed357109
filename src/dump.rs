use std::fmt;

use log::{Level, debug, log_enabled};

use crate::{
  block::{Block, HEADER_BYTES},
  directory::Blocks,
  heap::Heap,
  source::HeapSource,
};

/// Every block of a heap in address order.
///
/// The iterator is lazy and borrows the heap, so the heap cannot change
/// underneath it. Clone it, or call [`Heap::dump`] again, to start over.
///
/// Its [`Display`](fmt::Display) output lists one block per line followed by
/// a separator:
///
/// ```text
/// Pointer: 0x0 Size: 4 Is not available
/// Pointer: 0x24 Size: 128 Is available
/// ----------------
/// ```
#[derive(Debug, Clone)]
pub struct Dump<'a> {
  blocks: Blocks<'a>,
}

impl<'a> Dump<'a> {
  pub(crate) fn new(blocks: Blocks<'a>) -> Self {
    Self { blocks }
  }
}

impl Iterator for Dump<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    self.blocks.next()
  }
}

impl fmt::Display for Dump<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for block in self.clone() {
      writeln!(f, "{block}")?;
    }
    writeln!(f, "----------------")
  }
}

/// Totals over every block of a heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes of allocated blocks.
  pub allocated_bytes: usize,
  /// Payload bytes of free blocks.
  pub free_bytes: usize,
  pub largest_free: usize,
  /// Bytes obtained from the source, headers included.
  pub heap_bytes: usize,
}

impl Usage {
  /// Bytes spent on block headers.
  pub fn header_bytes(&self) -> usize {
    self.blocks * HEADER_BYTES
  }
}

impl<S: HeapSource> Heap<S> {
  pub fn usage(&self) -> Usage {
    self.dump().fold(
      Usage {
        heap_bytes: self.heap_bytes(),
        ..Usage::default()
      },
      |mut usage, block| {
        usage.blocks += 1;
        if block.is_free() {
          usage.free_blocks += 1;
          usage.free_bytes += block.size;
          usage.largest_free = usage.largest_free.max(block.size);
        } else {
          usage.allocated_bytes += block.size;
        }
        usage
      },
    )
  }

  /// Logs every block at debug level.
  pub fn log_blocks(&self) {
    if !log_enabled!(Level::Debug) {
      return;
    }
    for block in self.dump() {
      debug!("{block}");
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{BlockState, HEADER_BYTES as H, Heap};

  #[test]
  fn test_dump_is_restartable() {
    let mut heap = Heap::new();
    heap.allocate(4).unwrap();
    heap.allocate(8).unwrap();

    let dump = heap.dump();
    let first: Vec<_> = dump.clone().collect();
    let second: Vec<_> = dump.collect();
    assert_eq!(first, second);
    assert_eq!(first, heap.dump().collect::<Vec<_>>());
    assert_eq!(first.len(), 2);
  }

  #[test]
  fn test_dump_display() {
    let mut heap = Heap::new();
    let a = heap.allocate(4).unwrap();
    heap.allocate(128).unwrap();
    heap.release(a).unwrap();

    let expected = format!(
      "Pointer: 0x0 Size: 4 Is available\nPointer: {:#x} Size: 128 Is not available\n----------------\n",
      H + 4
    );
    assert_eq!(heap.dump().to_string(), expected);
  }

  #[test]
  fn test_empty_dump() {
    let heap = Heap::new();
    assert_eq!(heap.dump().count(), 0);
    assert_eq!(heap.dump().to_string(), "----------------\n");
  }

  #[test]
  fn test_usage() {
    let mut heap = Heap::new();
    let a = heap.allocate(10).unwrap();
    heap.allocate(20).unwrap();
    let c = heap.allocate(30).unwrap();
    heap.allocate(5).unwrap();
    heap.release(a).unwrap();
    heap.release(c).unwrap();

    let usage = heap.usage();
    assert_eq!(usage.blocks, 4);
    assert_eq!(usage.free_blocks, 2);
    assert_eq!(usage.allocated_bytes, 25);
    assert_eq!(usage.free_bytes, 40);
    assert_eq!(usage.largest_free, 30);
    assert_eq!(usage.heap_bytes, 65 + 4 * H);
    assert_eq!(usage.header_bytes() + 65, usage.heap_bytes);

    let states: Vec<_> = heap.dump().map(|block| block.state).collect();
    assert_eq!(
      states,
      [
        BlockState::Free,
        BlockState::Allocated,
        BlockState::Free,
        BlockState::Allocated
      ]
    );
  }
}
