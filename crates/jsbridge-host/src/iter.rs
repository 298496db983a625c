//! Host iteration protocol

use crate::array::{ArrayKey, HostArray};
use crate::error::HostResult;
use crate::value::HostValue;

/// Cursor-style iterator, the host side of `foreach`
///
/// Callers rewind once, then loop `valid` / `current` / `key` / `next`.
pub trait HostIterator {
    /// Reset the cursor to the first element
    fn rewind(&mut self) -> HostResult<()>;

    /// Check if the cursor points at an element
    fn valid(&mut self) -> HostResult<bool>;

    /// Value at the cursor
    fn current(&mut self) -> HostResult<HostValue>;

    /// Key at the cursor
    fn key(&mut self) -> HostResult<HostValue>;

    /// Advance the cursor
    fn next(&mut self) -> HostResult<()>;
}

/// Iterator over a snapshot of a [`HostArray`]
///
/// Later writes to the array are not observed.
#[derive(Debug)]
pub struct ArrayIterator {
    entries: Vec<(ArrayKey, HostValue)>,
    position: usize,
}

impl ArrayIterator {
    /// Snapshot the entries of `array`
    pub fn new(array: &HostArray) -> Self {
        Self {
            entries: array.entries(),
            position: 0,
        }
    }

    /// Iterate a plain list of values keyed `0..n`
    pub fn from_values(values: impl IntoIterator<Item = HostValue>) -> Self {
        Self::new(&HostArray::from_values(values))
    }
}

impl HostIterator for ArrayIterator {
    fn rewind(&mut self) -> HostResult<()> {
        self.position = 0;
        Ok(())
    }

    fn valid(&mut self) -> HostResult<bool> {
        Ok(self.position < self.entries.len())
    }

    fn current(&mut self) -> HostResult<HostValue> {
        Ok(self
            .entries
            .get(self.position)
            .map(|(_, value)| value.clone())
            .unwrap_or(HostValue::Null))
    }

    fn key(&mut self) -> HostResult<HostValue> {
        Ok(self
            .entries
            .get(self.position)
            .map(|(key, _)| key.to_host())
            .unwrap_or(HostValue::Null))
    }

    fn next(&mut self) -> HostResult<()> {
        self.position += 1;
        Ok(())
    }
}

/// Drain a host iterator into key/value pairs
pub fn collect_entries(iter: &mut dyn HostIterator) -> HostResult<Vec<(HostValue, HostValue)>> {
    let mut entries = Vec::new();
    iter.rewind()?;
    while iter.valid()? {
        entries.push((iter.key()?, iter.current()?));
        iter.next()?;
    }
    Ok(entries)
}
