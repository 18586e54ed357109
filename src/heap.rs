use log::{debug, info, trace, warn};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::{
  block::{Block, BlockAddr, BlockState, HEADER_BYTES},
  directory::Directory,
  dump::Dump,
  error::{HeapError, InvalidReleaseSnafu, InvalidSizeSnafu, OutOfMemorySnafu, UnknownBlockSnafu},
  source::{HeapSource, VecSource},
};

/// A worst-fit heap over a single address-ordered block directory.
///
/// The heap starts out empty. The first [`allocate`](Self::allocate) grows
/// the source by exactly one header plus the requested bytes; later requests
/// are served from the largest free block, splitting it when the remainder
/// can hold another block, and only grow the heap when no free block is big
/// enough. [`release`](Self::release) marks a block free and merges it with
/// its free neighbours.
#[derive(Debug)]
pub struct Heap<S = VecSource> {
  source: S,
  directory: Directory,
}

impl Heap<VecSource> {
  /// A heap over an unbounded in-process arena.
  pub fn new() -> Self {
    Self::with_source(VecSource::new())
  }

  /// A heap over an in-process arena that never exceeds `limit` bytes,
  /// headers included.
  pub fn with_limit(limit: usize) -> Self {
    Self::with_source(VecSource::with_limit(limit))
  }
}

impl Default for Heap<VecSource> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: HeapSource> Heap<S> {
  pub fn with_source(source: S) -> Self {
    Self {
      source,
      directory: Directory::default(),
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Whether the first allocation has happened.
  pub fn is_initialized(&self) -> bool {
    self.directory.is_initialized()
  }

  /// Bytes obtained from the source so far, headers included.
  pub fn heap_bytes(&self) -> usize {
    self.source.memory().len()
  }

  /// Obtains a block with at least `size` payload bytes.
  ///
  /// # Errors
  ///
  /// - [`HeapError::InvalidSize`] if `size` is zero or a header plus `size`
  ///   does not fit the address space.
  /// - [`HeapError::OutOfMemory`] if the heap had to grow and the source
  ///   refused.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<BlockAddr, HeapError> {
    ensure!(size > 0, InvalidSizeSnafu { size });
    let extent = HEADER_BYTES
      .checked_add(size)
      .filter(|&extent| extent <= isize::MAX as usize)
      .context(InvalidSizeSnafu { size })?;

    if !self.directory.is_initialized() {
      let at = self.grow(size, extent)?;
      info!("heap initialized at {at} with a {size} byte block");
      return Ok(at);
    }

    let memory = self.source.memory_mut();
    match self.directory.worst_fit(memory) {
      Some(found) if found.size >= size => {
        trace!("worst fit for {size} bytes: {} ({} bytes)", found.address, found.size);
        self.directory.split(memory, found.address, size);
        self.directory.set_state(memory, found.address, BlockState::Allocated);
        Ok(found.address)
      }
      largest => {
        trace!(
          "no free block holds {size} bytes (largest: {:?})",
          largest.map(|block| block.size)
        );
        self.grow(size, extent)
      }
    }
  }

  /// Appends a new allocated block behind the tail.
  fn grow(
    &mut self,
    size: usize,
    extent: usize,
  ) -> Result<BlockAddr, HeapError> {
    let start = self.source.grow(extent).context(OutOfMemorySnafu { extent })?;
    let at = BlockAddr::new(start);
    self
      .directory
      .append(self.source.memory_mut(), at, size, BlockState::Allocated);

    debug!("grew heap by {extent} bytes for {at}");
    Ok(at)
  }

  /// Releases a block obtained from [`allocate`](Self::allocate) and merges
  /// it with any free neighbours.
  ///
  /// # Errors
  ///
  /// [`HeapError::InvalidRelease`] if `address` is not a currently allocated
  /// block, including a block that was already released. The heap is left
  /// untouched in that case.
  pub fn release(
    &mut self,
    address: BlockAddr,
  ) -> Result<(), HeapError> {
    let memory = self.source.memory_mut();

    let allocated = self
      .directory
      .find(memory, address)
      .is_some_and(|block| block.state == BlockState::Allocated);
    if !allocated {
      warn!("rejected release of {address}");
      return InvalidReleaseSnafu { address }.fail();
    }

    self.directory.set_state(memory, address, BlockState::Free);
    self.directory.coalesce(memory, address);
    self.directory.sweep(memory);

    debug!("released {address}");
    Ok(())
  }

  /// The live block at `address`, if any.
  pub fn block(
    &self,
    address: BlockAddr,
  ) -> Option<Block> {
    self.directory.find(self.source.memory(), address)
  }

  fn allocated(
    &self,
    address: BlockAddr,
  ) -> Result<Block, HeapError> {
    self
      .block(address)
      .filter(|block| block.state == BlockState::Allocated)
      .context(UnknownBlockSnafu { address })
  }

  /// The payload of an allocated block, exactly `size` bytes long.
  pub fn payload(
    &self,
    address: BlockAddr,
  ) -> Result<&[u8], HeapError> {
    let block = self.allocated(address)?;
    Ok(&self.source.memory()[address.payload()..block.end()])
  }

  pub fn payload_mut(
    &mut self,
    address: BlockAddr,
  ) -> Result<&mut [u8], HeapError> {
    let block = self.allocated(address)?;
    Ok(&mut self.source.memory_mut()[address.payload()..block.end()])
  }

  /// Every block in address order. Call again to start over.
  pub fn dump(&self) -> Dump<'_> {
    Dump::new(self.directory.blocks(self.source.memory()))
  }

  /// Checks the structural invariants of the block directory.
  pub fn verify(&self) -> Result<(), HeapError> {
    self.directory.verify(self.source.memory())
  }
}
