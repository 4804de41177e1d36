//! Iterator and comparator contracts shared by block readers
//!
//! [`BlockIterator`] is the cursor interface every sorted block exposes.
//! The vertical block iterator implements it, and the sort-merge iterator
//! consumes any two implementations of it.

mod merge;

pub use merge::SortMergeIterator;

use std::cmp::Ordering;

use crate::{ColsmError, Result};

/// Outcome of the last positioning call on an iterator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    NotFound(String),
    NotSupported(String),
    InvalidArgument(String),
    Corruption(String),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound(_))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Status::NotSupported(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Status::Corruption(_))
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Status::Ok => Ok(()),
            Status::NotFound(msg) => Err(ColsmError::NotFound(msg)),
            Status::NotSupported(msg) => Err(ColsmError::NotSupported(msg)),
            Status::InvalidArgument(msg) => Err(ColsmError::InvalidKey(msg)),
            Status::Corruption(msg) => Err(ColsmError::Corruption(msg)),
        }
    }
}

impl From<ColsmError> for Status {
    fn from(err: ColsmError) -> Self {
        match err {
            ColsmError::NotFound(msg) => Status::NotFound(msg),
            ColsmError::NotSupported(msg) => Status::NotSupported(msg),
            ColsmError::InvalidKey(msg) => Status::InvalidArgument(msg),
            e @ (ColsmError::KeyOrder { .. } | ColsmError::Config(_)) => {
                Status::InvalidArgument(e.to_string())
            }
            ColsmError::Corruption(msg) => Status::Corruption(msg),
            other => Status::Corruption(other.to_string()),
        }
    }
}

/// Cursor over a sorted run of key/value entries.
///
/// `key()` and `value()` are only meaningful while `valid()` is true;
/// check `status()` after every positioning call.
pub trait BlockIterator {
    fn valid(&self) -> bool;

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    /// Position at the first entry whose key is `>= target`.
    fn seek(&mut self, target: &[u8]);

    fn next(&mut self);

    fn prev(&mut self);

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn status(&self) -> Status;
}

/// Total order over keys
pub trait Comparator: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte order
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "colsm.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders keys by their leading 4 bytes read as a native-endian u32,
/// the user key of the vertical layout. Keys shorter than 4 bytes fall
/// back to byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntComparator;

impl Comparator for IntComparator {
    fn name(&self) -> &'static str {
        "colsm.IntComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (a.get(..4), b.get(..4)) {
            (Some(x), Some(y)) => {
                let x = u32::from_ne_bytes([x[0], x[1], x[2], x[3]]);
                let y = u32::from_ne_bytes([y[0], y[1], y[2], y[3]]);
                x.cmp(&y)
            }
            _ => a.cmp(b),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// In-memory iterator over sorted entries, for exercising consumers.
    pub struct VecIterator {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        index: Option<usize>,
    }

    impl VecIterator {
        pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            Self {
                entries,
                index: None,
            }
        }

        /// Entries keyed by native-endian u32, valued by the key's decimal text.
        pub fn from_u32(keys: &[u32]) -> Self {
            Self::new(
                keys.iter()
                    .map(|k| (k.to_ne_bytes().to_vec(), k.to_string().into_bytes()))
                    .collect(),
            )
        }
    }

    impl BlockIterator for VecIterator {
        fn valid(&self) -> bool {
            matches!(self.index, Some(i) if i < self.entries.len())
        }

        fn seek_to_first(&mut self) {
            self.index = Some(0);
        }

        fn seek_to_last(&mut self) {
            self.index = self.entries.len().checked_sub(1);
        }

        fn seek(&mut self, target: &[u8]) {
            let pos = self
                .entries
                .iter()
                .position(|(k, _)| IntComparator.compare(k, target) != Ordering::Less);
            self.index = Some(pos.unwrap_or(self.entries.len()));
        }

        fn next(&mut self) {
            if let Some(i) = self.index {
                self.index = Some(i + 1);
            }
        }

        fn prev(&mut self) {
            self.index = match self.index {
                Some(0) | None => None,
                Some(i) => Some(i - 1),
            };
        }

        fn key(&self) -> &[u8] {
            match self.index {
                Some(i) if i < self.entries.len() => &self.entries[i].0,
                _ => &[],
            }
        }

        fn value(&self) -> &[u8] {
            match self.index {
                Some(i) if i < self.entries.len() => &self.entries[i].1,
                _ => &[],
            }
        }

        fn status(&self) -> Status {
            Status::Ok
        }
    }
}
