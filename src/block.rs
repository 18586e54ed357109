use std::{fmt, mem};

const WORD: usize = mem::size_of::<usize>();

const PREV: usize = 0;
const NEXT: usize = WORD;
const SIZE: usize = 2 * WORD;
const TAG: usize = 3 * WORD;

/// Bytes occupied by a block header. The payload starts right after it.
pub const HEADER_BYTES: usize = 4 * WORD;

/// Encodes a missing `prev`/`next` link.
const NIL: usize = usize::MAX;

const FREE_TAG: usize = 0x4652_4545;
const ALLOCATED_TAG: usize = 0x414c_4c4f;
/// Written over the tag of a header absorbed by a merge.
const DEAD_TAG: usize = 0;

/// Location of a block header inside the heap, as a byte offset.
///
/// This is the handle handed out by [`Heap::allocate`](crate::Heap::allocate)
/// and taken back by [`Heap::release`](crate::Heap::release).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddr(usize);

impl BlockAddr {
  pub const fn new(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn offset(self) -> usize {
    self.0
  }

  /// Offset of the first payload byte.
  pub const fn payload(self) -> usize {
    self.0 + HEADER_BYTES
  }
}

impl fmt::Display for BlockAddr {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:#x}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  Free,
  Allocated,
}

impl BlockState {
  const fn tag(self) -> usize {
    match self {
      Self::Free => FREE_TAG,
      Self::Allocated => ALLOCATED_TAG,
    }
  }

  const fn from_tag(tag: usize) -> Option<Self> {
    match tag {
      FREE_TAG => Some(Self::Free),
      ALLOCATED_TAG => Some(Self::Allocated),
      _ => None,
    }
  }
}

/// Snapshot of one block, as reported by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub address: BlockAddr,
  pub size: usize,
  pub state: BlockState,
}

impl Block {
  pub const fn is_free(&self) -> bool {
    matches!(self.state, BlockState::Free)
  }

  /// One past the last payload byte.
  pub const fn end(&self) -> usize {
    self.address.payload() + self.size
  }
}

impl fmt::Display for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let availability = match self.state {
      BlockState::Free => "Is available",
      BlockState::Allocated => "Is not available",
    };
    write!(f, "Pointer: {} Size: {} {}", self.address, self.size, availability)
  }
}

/// In-memory header of a block, decoded from the heap bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub prev: Option<BlockAddr>,
  pub next: Option<BlockAddr>,
  pub size: usize,
  pub state: BlockState,
}

impl Header {
  /// Decodes the header at `at`. Returns `None` when `at` is out of bounds
  /// or does not hold a live header.
  pub fn read(
    memory: &[u8],
    at: BlockAddr,
  ) -> Option<Self> {
    let end = at.offset().checked_add(HEADER_BYTES)?;
    let bytes = memory.get(at.offset()..end)?;
    let state = BlockState::from_tag(word(bytes, TAG))?;

    Some(Self {
      prev: link(word(bytes, PREV)),
      next: link(word(bytes, NEXT)),
      size: word(bytes, SIZE),
      state,
    })
  }

  pub fn write(
    &self,
    memory: &mut [u8],
    at: BlockAddr,
  ) {
    let bytes = &mut memory[at.offset()..at.payload()];
    put_word(bytes, PREV, self.prev.map_or(NIL, BlockAddr::offset));
    put_word(bytes, NEXT, self.next.map_or(NIL, BlockAddr::offset));
    put_word(bytes, SIZE, self.size);
    put_word(bytes, TAG, self.state.tag());
  }

  /// Makes the header at `at` undecodable.
  pub fn scrub(
    memory: &mut [u8],
    at: BlockAddr,
  ) {
    put_word(&mut memory[at.offset()..at.payload()], TAG, DEAD_TAG);
  }

  pub fn snapshot(
    &self,
    at: BlockAddr,
  ) -> Block {
    Block {
      address: at,
      size: self.size,
      state: self.state,
    }
  }
}

fn word(
  bytes: &[u8],
  field: usize,
) -> usize {
  let mut raw = [0u8; WORD];
  raw.copy_from_slice(&bytes[field..field + WORD]);
  usize::from_ne_bytes(raw)
}

fn put_word(
  bytes: &mut [u8],
  field: usize,
  value: usize,
) {
  bytes[field..field + WORD].copy_from_slice(&value.to_ne_bytes());
}

fn link(raw: usize) -> Option<BlockAddr> {
  (raw != NIL).then_some(BlockAddr(raw))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_BYTES, 4 * mem::size_of::<usize>());
    assert_eq!(BlockAddr::new(8).payload(), 8 + HEADER_BYTES);
  }

  #[test]
  fn test_header_write_read() {
    let mut memory = vec![0u8; 3 * HEADER_BYTES];
    let at = BlockAddr::new(HEADER_BYTES);

    let header = Header {
      prev: Some(BlockAddr::new(0)),
      next: None,
      size: 17,
      state: BlockState::Allocated,
    };
    header.write(&mut memory, at);

    assert_eq!(Header::read(&memory, at), Some(header));
    // Neighbouring bytes are untouched.
    assert!(memory[..HEADER_BYTES].iter().all(|&b| b == 0));
    assert!(memory[2 * HEADER_BYTES..].iter().all(|&b| b == 0));
  }

  #[test]
  fn test_header_read_rejects_garbage() {
    let memory = vec![0u8; 2 * HEADER_BYTES];

    // Zeroed bytes carry no valid tag.
    assert_eq!(Header::read(&memory, BlockAddr::new(0)), None);
    // Not enough room for a header.
    assert_eq!(Header::read(&memory, BlockAddr::new(HEADER_BYTES + 1)), None);
    assert_eq!(Header::read(&memory, BlockAddr::new(usize::MAX)), None);
  }

  #[test]
  fn test_scrub() {
    let mut memory = vec![0u8; HEADER_BYTES];
    let at = BlockAddr::new(0);

    Header {
      prev: None,
      next: None,
      size: 4,
      state: BlockState::Free,
    }
    .write(&mut memory, at);
    assert!(Header::read(&memory, at).is_some());

    Header::scrub(&mut memory, at);
    assert_eq!(Header::read(&memory, at), None);
  }

  #[test]
  fn test_block_display() {
    let block = Block {
      address: BlockAddr::new(0x40),
      size: 128,
      state: BlockState::Free,
    };
    assert_eq!(block.to_string(), "Pointer: 0x40 Size: 128 Is available");
    assert_eq!(block.end(), 0x40 + HEADER_BYTES + 128);
  }
}
