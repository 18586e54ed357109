use log::debug;
use snafu::ensure;

use crate::{
  block::{Block, BlockAddr, BlockState, HEADER_BYTES, Header},
  error::{CorruptedSnafu, HeapError},
};

#[derive(Debug, Default)]
pub(crate) struct Directory {
  head: Option<BlockAddr>,
  tail: Option<BlockAddr>,
}

/// Decodes a header that the directory itself linked in.
///
/// Headers are only written by the directory and the safe API never hands
/// out header bytes, so failing to decode one is a bug.
fn header(
  memory: &[u8],
  at: BlockAddr,
) -> Header {
  match Header::read(memory, at) {
    Some(header) => header,
    None => panic!("corrupt block header at {at}"),
  }
}

impl Directory {
  pub fn is_initialized(&self) -> bool {
    self.head.is_some()
  }

  /// Links a new block whose header goes at `at`, after the current tail.
  /// The first block appended becomes the head for good.
  pub fn append(
    &mut self,
    memory: &mut [u8],
    at: BlockAddr,
    size: usize,
    state: BlockState,
  ) {
    Header {
      prev: self.tail,
      next: None,
      size,
      state,
    }
    .write(memory, at);

    match self.tail {
      Some(tail) => {
        let mut tail_header = header(memory, tail);
        tail_header.next = Some(at);
        tail_header.write(memory, tail);
      }
      None => self.head = Some(at),
    }
    self.tail = Some(at);
  }

  /// The largest free block, the earliest one on ties.
  pub fn worst_fit(
    &self,
    memory: &[u8],
  ) -> Option<Block> {
    let mut found: Option<Block> = None;

    for block in self.blocks(memory) {
      if !block.is_free() {
        continue;
      }
      if found.is_none_or(|best| block.size > best.size) {
        found = Some(block);
      }
    }

    found
  }

  /// Shrinks the block at `at` to `size` payload bytes and links the
  /// remainder as a new free block right behind it.
  ///
  /// Returns the address of the new block, or `None` when the remainder
  /// cannot hold a header plus at least one payload byte, in which case
  /// nothing changes.
  pub fn split(
    &mut self,
    memory: &mut [u8],
    at: BlockAddr,
    size: usize,
  ) -> Option<BlockAddr> {
    let mut found = header(memory, at);
    let leftover = found
      .size
      .checked_sub(HEADER_BYTES + size)
      .filter(|&leftover| leftover > 0)?;

    let rest = BlockAddr::new(at.payload() + size);
    Header {
      prev: Some(at),
      next: found.next,
      size: leftover,
      state: BlockState::Free,
    }
    .write(memory, rest);

    match found.next {
      Some(next) => {
        let mut next_header = header(memory, next);
        next_header.prev = Some(rest);
        next_header.write(memory, next);
      }
      None => self.tail = Some(rest),
    }

    found.next = Some(rest);
    found.size = size;
    found.write(memory, at);

    debug!("split {at}: kept {size} bytes, {rest} holds {leftover} free bytes");
    Some(rest)
  }

  pub fn set_state(
    &self,
    memory: &mut [u8],
    at: BlockAddr,
    state: BlockState,
  ) {
    let mut found = header(memory, at);
    found.state = state;
    found.write(memory, at);
  }

  /// Absorbs the successor of `at` if both blocks are free.
  ///
  /// Returns whether a merge happened.
  pub fn merge_with_next(
    &mut self,
    memory: &mut [u8],
    at: BlockAddr,
  ) -> bool {
    let mut survivor = header(memory, at);
    let Some(next) = survivor.next else {
      return false;
    };
    let absorbed = header(memory, next);
    if survivor.state != BlockState::Free || absorbed.state != BlockState::Free {
      return false;
    }

    survivor.size += absorbed.size + HEADER_BYTES;
    survivor.next = absorbed.next;
    survivor.write(memory, at);

    match absorbed.next {
      Some(after) => {
        let mut after_header = header(memory, after);
        after_header.prev = Some(at);
        after_header.write(memory, after);
      }
      None => self.tail = Some(at),
    }
    Header::scrub(memory, next);

    debug!("merged {next} into {at}, now {} bytes", survivor.size);
    true
  }

  /// Merges the block at `at` with whichever of its neighbours are free.
  pub fn coalesce(
    &mut self,
    memory: &mut [u8],
    at: BlockAddr,
  ) {
    let prev = header(memory, at).prev;
    self.merge_with_next(memory, at);
    if let Some(prev) = prev {
      self.merge_with_next(memory, prev);
    }
  }

  /// Walks the whole directory and collapses every run of free blocks.
  pub fn sweep(
    &mut self,
    memory: &mut [u8],
  ) {
    let mut cursor = self.head;
    while let Some(at) = cursor {
      while self.merge_with_next(memory, at) {}
      cursor = header(memory, at).next;
    }
  }

  /// Looks up a block that is currently linked into the directory.
  pub fn find(
    &self,
    memory: &[u8],
    at: BlockAddr,
  ) -> Option<Block> {
    // Blocks are address ordered, so the walk can stop early.
    self
      .blocks(memory)
      .take_while(|block| block.address <= at)
      .find(|block| block.address == at)
  }

  pub fn blocks<'a>(
    &self,
    memory: &'a [u8],
  ) -> Blocks<'a> {
    Blocks {
      memory,
      next: self.head,
    }
  }

  /// Checks every structural invariant of the directory against the heap
  /// bytes handed out so far.
  pub fn verify(
    &self,
    memory: &[u8],
  ) -> Result<(), HeapError> {
    let Some(head) = self.head else {
      ensure!(
        self.tail.is_none() && memory.is_empty(),
        CorruptedSnafu {
          address: BlockAddr::new(0),
          reason: "uninitialized directory over a non-empty heap",
        }
      );
      return Ok(());
    };
    ensure!(
      head.offset() == 0,
      CorruptedSnafu {
        address: head,
        reason: "head is not at the start of the heap",
      }
    );

    let mut prev: Option<Block> = None;
    let mut cursor = Some(head);
    while let Some(at) = cursor {
      let Some(current) = Header::read(memory, at) else {
        return CorruptedSnafu {
          address: at,
          reason: "undecodable header",
        }
        .fail();
      };
      ensure!(
        current.prev == prev.map(|block| block.address),
        CorruptedSnafu {
          address: at,
          reason: "prev link does not point at predecessor",
        }
      );
      if let Some(prev) = prev {
        ensure!(
          prev.end() == at.offset(),
          CorruptedSnafu {
            address: at,
            reason: "block does not start where its predecessor ends",
          }
        );
        ensure!(
          !(prev.is_free() && current.state == BlockState::Free),
          CorruptedSnafu {
            address: at,
            reason: "adjacent free blocks were not coalesced",
          }
        );
      }

      let block = current.snapshot(at);
      ensure!(
        block.end() <= memory.len(),
        CorruptedSnafu {
          address: at,
          reason: "payload runs past the end of the heap",
        }
      );
      prev = Some(block);
      cursor = current.next;
    }

    let last = prev.map(|block| block.address);
    ensure!(
      last == self.tail,
      CorruptedSnafu {
        address: last.unwrap_or(head),
        reason: "tail is not the last block",
      }
    );
    let end = prev.map_or(0, |block| block.end());
    ensure!(
      end == memory.len(),
      CorruptedSnafu {
        address: last.unwrap_or(head),
        reason: "last block does not end at the end of the heap",
      }
    );

    Ok(())
  }
}

/// Iterator over the blocks of a directory in address order.
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
  memory: &'a [u8],
  next: Option<BlockAddr>,
}

impl Iterator for Blocks<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let at = self.next?;
    let current = header(self.memory, at);
    self.next = current.next;
    Some(current.snapshot(at))
  }
}
