use std::{collections::TryReserveError, io};

use snafu::{Location, Snafu};

use crate::block::BlockAddr;

/// Errors reported by [`Heap`](crate::Heap) operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HeapError {
  #[snafu(display("invalid allocation size: {size}"))]
  InvalidSize {
    size: usize,
    #[snafu(implicit)]
    location: Location,
  },
  #[snafu(display("out of memory while growing the heap by {extent} bytes"))]
  OutOfMemory {
    extent: usize,
    source: GrowError,
    #[snafu(implicit)]
    location: Location,
  },
  #[snafu(display("release of {address}, which is not an allocated block"))]
  InvalidRelease {
    address: BlockAddr,
    #[snafu(implicit)]
    location: Location,
  },
  #[snafu(display("{address} is not an allocated block"))]
  UnknownBlock {
    address: BlockAddr,
    #[snafu(implicit)]
    location: Location,
  },
  #[snafu(display("corrupt block directory at {address}: {reason}"))]
  Corrupted {
    address: BlockAddr,
    reason: &'static str,
    #[snafu(implicit)]
    location: Location,
  },
}

/// Errors raised by a [`HeapSource`](crate::HeapSource) that cannot extend
/// the heap.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GrowError {
  #[snafu(display("heap limit of {limit} bytes exceeded ({used} in use, {extent} requested)"))]
  LimitExceeded {
    limit: usize,
    used: usize,
    extent: usize,
  },
  #[snafu(display("failed to reserve {extent} bytes"))]
  Reserve {
    extent: usize,
    source: TryReserveError,
  },
  #[snafu(display("extent of {extent} bytes does not fit the address space"))]
  TooLarge { extent: usize },
  #[snafu(display("sbrk({extent}) failed"))]
  Sbrk { extent: usize, source: io::Error },
  #[snafu(display("program break moved to {actual:#x}, expected {expected:#x}"))]
  Discontiguous { expected: usize, actual: usize },
}

impl HeapError {
  pub fn is_out_of_memory(&self) -> bool {
    matches!(self, Self::OutOfMemory { .. })
  }
}
