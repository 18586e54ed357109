use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::error::{GrowError, LimitExceededSnafu, ReserveSnafu, TooLargeSnafu};

pub trait HeapSource {
  /// Extends the heap by `extent` bytes and returns the offset of the first
  /// new byte, which always equals the previous length of [`memory`].
  ///
  /// [`memory`]: HeapSource::memory
  fn grow(
    &mut self,
    extent: usize,
  ) -> Result<usize, GrowError>;

  /// Every byte handed out so far.
  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];
}

/// In-process arena backed by a `Vec<u8>`.
#[derive(Debug, Default)]
pub struct VecSource {
  bytes: Vec<u8>,
  limit: Option<usize>,
}

impl VecSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// An arena that refuses to grow past `limit` bytes.
  pub fn with_limit(limit: usize) -> Self {
    Self {
      bytes: Vec::new(),
      limit: Some(limit),
    }
  }
}

impl HeapSource for VecSource {
  fn grow(
    &mut self,
    extent: usize,
  ) -> Result<usize, GrowError> {
    let used = self.bytes.len();
    let new_len = used
      .checked_add(extent)
      .filter(|&len| len <= isize::MAX as usize)
      .context(TooLargeSnafu { extent })?;

    if let Some(limit) = self.limit {
      ensure!(new_len <= limit, LimitExceededSnafu { limit, used, extent });
    }

    self.bytes.try_reserve(extent).context(ReserveSnafu { extent })?;
    self.bytes.resize(new_len, 0);

    Ok(used)
  }

  fn memory(&self) -> &[u8] {
    &self.bytes
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_grow_appends() {
    let mut source = VecSource::new();

    assert_eq!(source.grow(16).unwrap(), 0);
    assert_eq!(source.grow(8).unwrap(), 16);
    assert_eq!(source.memory().len(), 24);
  }

  #[test]
  fn test_limit() {
    let mut source = VecSource::with_limit(32);

    assert_eq!(source.grow(24).unwrap(), 0);
    assert!(matches!(
      source.grow(16),
      Err(GrowError::LimitExceeded { limit: 32, used: 24, extent: 16 })
    ));
    // A failed request leaves the arena untouched.
    assert_eq!(source.memory().len(), 24);
    assert_eq!(source.grow(8).unwrap(), 24);
  }

  #[test]
  fn test_growth_is_amortized() {
    let mut source = VecSource::new();
    let mut reallocations = 0;
    let mut capacity = source.bytes.capacity();

    for _ in 0..4096 {
      source.grow(40).unwrap();
      if source.bytes.capacity() != capacity {
        capacity = source.bytes.capacity();
        reallocations += 1;
      }
    }

    assert_eq!(source.memory().len(), 4096 * 40);
    assert!(reallocations < 32, "{reallocations} reallocations");
  }

  #[test]
  fn test_too_large() {
    let mut source = VecSource::new();
    source.grow(1).unwrap();

    assert!(matches!(source.grow(usize::MAX), Err(GrowError::TooLarge { .. })));
  }
}
