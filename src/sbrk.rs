use std::{io, ptr, slice};

use libc::{c_void, intptr_t, sbrk};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::{
  error::{DiscontiguousSnafu, GrowError, SbrkSnafu, TooLargeSnafu},
  source::HeapSource,
};

/// Current program break, as reported by `sbrk(0)`.
pub fn program_break() -> *mut u8 {
  unsafe { sbrk(0) }.cast()
}

/// Grows the heap by moving the process's program break.
///
/// The first extent fixes the base of the heap. Every later extent must
/// start exactly where the previous one ended; if anything else in the
/// process moved the break in between, growth fails with
/// [`GrowError::Discontiguous`]. The break is never lowered again.
#[derive(Debug)]
pub struct SbrkSource {
  base: *mut u8,
  len: usize,
}

impl SbrkSource {
  pub fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      len: 0,
    }
  }

  /// Start of the first extent, or null before the first growth.
  pub fn base(&self) -> *mut u8 {
    self.base
  }
}

impl Default for SbrkSource {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapSource for SbrkSource {
  fn grow(
    &mut self,
    extent: usize,
  ) -> Result<usize, GrowError> {
    let increment = intptr_t::try_from(extent).ok().context(TooLargeSnafu { extent })?;
    let new_len = self.len.checked_add(extent).context(TooLargeSnafu { extent })?;

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return Err(io::Error::last_os_error()).context(SbrkSnafu { extent });
    }

    let address = address.cast::<u8>();
    if self.base.is_null() {
      self.base = address;
    } else {
      let expected = self.base.addr() + self.len;
      ensure!(
        address.addr() == expected,
        DiscontiguousSnafu {
          expected,
          actual: address.addr(),
        }
      );
    }

    let offset = self.len;
    self.len = new_len;
    Ok(offset)
  }

  fn memory(&self) -> &[u8] {
    if self.base.is_null() {
      return &[];
    }
    // SAFETY: `base..base + len` was handed to us by `sbrk` in contiguous
    // extents and is only ever reached through this source.
    unsafe { slice::from_raw_parts(self.base, self.len) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    if self.base.is_null() {
      return &mut [];
    }
    // SAFETY: see `memory`; `&mut self` makes the borrow exclusive.
    unsafe { slice::from_raw_parts_mut(self.base, self.len) }
  }
}
