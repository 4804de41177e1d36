//! Two-way sort-merge iterator used to fold blocks during compaction

use std::cmp::Ordering;

use super::{BlockIterator, Comparator, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Left,
    Right,
    Exhausted,
}

/// Merges two sorted iterators into one sorted stream.
///
/// On equal keys the left entry is emitted and the right one is dropped.
/// An exhausted input never wins a comparison. Only forward iteration
/// from the construction point is supported; seeking and `prev` report
/// `NotSupported`.
pub struct SortMergeIterator<L, R, C> {
    left: L,
    right: R,
    comparator: C,
    current: Current,
    status: Status,
}

impl<L, R, C> SortMergeIterator<L, R, C>
where
    L: BlockIterator,
    R: BlockIterator,
    C: Comparator,
{
    /// Position both inputs at their first entries and select the smaller.
    pub fn new(mut left: L, mut right: R, comparator: C) -> Self {
        left.seek_to_first();
        right.seek_to_first();
        let mut iter = Self {
            left,
            right,
            comparator,
            current: Current::Exhausted,
            status: Status::Ok,
        };
        iter.find_smallest();
        iter
    }

    fn find_smallest(&mut self) {
        self.current = match (self.left.valid(), self.right.valid()) {
            (true, true) => match self.comparator.compare(self.left.key(), self.right.key()) {
                Ordering::Less => Current::Left,
                Ordering::Greater => Current::Right,
                Ordering::Equal => {
                    self.right.next();
                    Current::Left
                }
            },
            (true, false) => Current::Left,
            (false, true) => Current::Right,
            (false, false) => Current::Exhausted,
        };
    }

    fn unsupported(&mut self, op: &str) {
        self.status = Status::NotSupported(format!("{} on a sort-merge iterator", op));
    }

    pub fn into_inner(self) -> (L, R) {
        (self.left, self.right)
    }
}

impl<L, R, C> BlockIterator for SortMergeIterator<L, R, C>
where
    L: BlockIterator,
    R: BlockIterator,
    C: Comparator,
{
    fn valid(&self) -> bool {
        self.current != Current::Exhausted
    }

    fn seek_to_first(&mut self) {
        self.unsupported("seek_to_first");
    }

    fn seek_to_last(&mut self) {
        self.unsupported("seek_to_last");
    }

    fn seek(&mut self, _target: &[u8]) {
        self.unsupported("seek");
    }

    fn next(&mut self) {
        match self.current {
            Current::Left => self.left.next(),
            Current::Right => self.right.next(),
            Current::Exhausted => return,
        }
        self.find_smallest();
    }

    fn prev(&mut self) {
        self.unsupported("prev");
    }

    fn key(&self) -> &[u8] {
        match self.current {
            Current::Left => self.left.key(),
            Current::Right => self.right.key(),
            Current::Exhausted => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match self.current {
            Current::Left => self.left.value(),
            Current::Right => self.right.value(),
            Current::Exhausted => &[],
        }
    }

    fn status(&self) -> Status {
        if !self.status.is_ok() {
            return self.status.clone();
        }
        let left = self.left.status();
        if !left.is_ok() {
            return left;
        }
        self.right.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::testutil::VecIterator;
    use crate::iterator::IntComparator;
    use crate::key::{user_key_to_u32, InternalKey, ValueType};
    use crate::vblock::{VertBlock, VertBlockBuilder, VertBlockOptions};

    fn collect<I: BlockIterator>(iter: &mut I) -> Vec<(u32, Vec<u8>)> {
        let mut out = Vec::new();
        while iter.valid() {
            out.push((user_key_to_u32(iter.key()).unwrap(), iter.value().to_vec()));
            iter.next();
        }
        out
    }

    fn keys<I: BlockIterator>(iter: &mut I) -> Vec<u32> {
        collect(iter).into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_merge_interleaved() {
        let left = VecIterator::from_u32(&[1, 3, 5, 7, 9, 10, 11, 13, 14]);
        let right = VecIterator::from_u32(&[2, 4, 6, 8, 10, 12]);
        let mut merged = SortMergeIterator::new(left, right, IntComparator);

        let entries = collect(&mut merged);
        assert_eq!(
            entries.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            (1..=14).collect::<Vec<_>>()
        );
        assert_eq!(entries.len(), 14);
        assert!(merged.status().is_ok());
    }

    #[test]
    fn test_merge_duplicate_keeps_left() {
        let left = VecIterator::new(vec![
            (5u32.to_ne_bytes().to_vec(), b"left".to_vec()),
            (6u32.to_ne_bytes().to_vec(), b"left".to_vec()),
        ]);
        let right = VecIterator::new(vec![
            (5u32.to_ne_bytes().to_vec(), b"right".to_vec()),
            (7u32.to_ne_bytes().to_vec(), b"right".to_vec()),
        ]);
        let mut merged = SortMergeIterator::new(left, right, IntComparator);
        assert_eq!(
            collect(&mut merged),
            vec![
                (5, b"left".to_vec()),
                (6, b"left".to_vec()),
                (7, b"right".to_vec()),
            ]
        );
    }

    #[test]
    fn test_merge_one_side_empty() {
        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[]),
            VecIterator::from_u32(&[3, 4]),
            IntComparator,
        );
        assert_eq!(keys(&mut merged), vec![3, 4]);

        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[1, 2]),
            VecIterator::from_u32(&[]),
            IntComparator,
        );
        assert_eq!(keys(&mut merged), vec![1, 2]);
    }

    #[test]
    fn test_merge_both_empty() {
        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[]),
            VecIterator::from_u32(&[]),
            IntComparator,
        );
        assert!(!merged.valid());
        assert!(merged.key().is_empty());
        merged.next();
        assert!(!merged.valid());
    }

    #[test]
    fn test_merge_right_outlasts_left() {
        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[1]),
            VecIterator::from_u32(&[1, 2, 3, 4]),
            IntComparator,
        );
        assert_eq!(keys(&mut merged), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_unsupported_ops() {
        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[1]),
            VecIterator::from_u32(&[2]),
            IntComparator,
        );
        merged.seek(&1u32.to_ne_bytes());
        assert!(merged.status().is_not_supported());
        merged.prev();
        assert!(merged.status().is_not_supported());
        // the merged stream is still readable
        assert_eq!(keys(&mut merged), vec![1, 2]);
    }

    #[test]
    fn test_merge_vertical_blocks() {
        let build = |input: &mut dyn Iterator<Item = u32>, seq: u64| {
            let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
            for k in input {
                let key = InternalKey::from_u32(k, seq, ValueType::Value);
                builder.add(key.encode(), &seq.to_ne_bytes()).unwrap();
            }
            builder.finish().unwrap().to_vec()
        };
        let left = VertBlock::from_bytes(build(&mut (0..3000u32).map(|i| i * 2), 2)).unwrap();
        let right = VertBlock::from_bytes(build(&mut (0..3000u32).map(|i| i * 3), 1)).unwrap();

        let mut merged = SortMergeIterator::new(left.iter(), right.iter(), IntComparator);
        let entries = collect(&mut merged);

        let mut expected: Vec<u32> = (0..3000u32).map(|i| i * 2).collect();
        expected.extend((0..3000u32).map(|i| i * 3));
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(
            entries.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            expected
        );

        // the left block wins ties and ends at 5998
        for (k, v) in &entries {
            if k % 6 == 0 || (k % 2 == 0 && *k <= 5998) {
                assert_eq!(v.as_slice(), &2u64.to_ne_bytes());
            } else {
                assert_eq!(v.as_slice(), &1u64.to_ne_bytes());
            }
        }
        assert!(merged.status().is_ok());
    }

    #[test]
    fn test_merge_into_new_block() {
        let mut merged = SortMergeIterator::new(
            VecIterator::from_u32(&[1, 4, 9]),
            VecIterator::from_u32(&[2, 4, 8]),
            IntComparator,
        );
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        while merged.valid() {
            let key = InternalKey::new(merged.key(), 1, ValueType::Value);
            builder.add(key.encode(), merged.value()).unwrap();
            merged.next();
        }
        let data = builder.finish().unwrap().to_vec();
        let block = VertBlock::from_slice(&data).unwrap();
        let mut iter = block.iter();
        iter.seek_to_first();
        assert_eq!(keys(&mut iter), vec![1, 2, 4, 8, 9]);
    }
}
