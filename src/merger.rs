//! Merge heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A record tagged with the chunk it was read from. Many entries per chunk
/// may sit in the heap at once, up to the per-chunk quota.
#[derive(Debug, PartialEq, Eq)]
struct HeapEntry<T> {
    record: T,
    chunk: usize,
}

impl<T: Ord> Ord for HeapEntry<T> {
    // Reversed so that BinaryHeap (a max-heap) yields the minimum record.
    // Ordering between equal records from different chunks is arbitrary.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .record
            .cmp(&self.record)
            .then_with(|| other.chunk.cmp(&self.chunk))
    }
}

impl<T: Ord> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap over chunk-tagged records.
/// Merges multiple sorted chunk streams into a single sorted output: the heap
/// holds the frontmost unconsumed records of every still-active chunk, so the
/// popped minimum is never greater than any record remaining in any chunk.
pub struct MergeHeap<T> {
    items: BinaryHeap<HeapEntry<T>>,
}

impl<T: Ord> MergeHeap<T> {
    /// Creates a heap preallocated for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        MergeHeap {
            items: BinaryHeap::with_capacity(capacity),
        }
    }

    /// Inserts a record originating from `chunk`.
    pub fn push(&mut self, record: T, chunk: usize) {
        self.items.push(HeapEntry { record, chunk });
    }

    /// Returns the minimum record without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.peek().map(|entry| &entry.record)
    }

    /// Removes and returns the minimum record along with its origin chunk.
    pub fn pop(&mut self) -> Option<(T, usize)> {
        self.items.pop().map(|entry| (entry.record, entry.chunk))
    }

    /// Returns the number of entries in the heap.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::MergeHeap;

    #[rstest]
    #[case(
        vec![(4, 0), (1, 1), (3, 2), (5, 0), (6, 1), (7, 0)],
        vec![1, 3, 4, 5, 6, 7],
    )]
    #[case(
        vec![(2, 0), (2, 1), (1, 0), (2, 0)],
        vec![1, 2, 2, 2],
    )]
    #[case(vec![], vec![])]
    fn test_merge_heap_pops_ascending(#[case] entries: Vec<(i32, usize)>, #[case] expected: Vec<i32>) {
        let mut heap = MergeHeap::with_capacity(entries.len());
        for (record, chunk) in entries {
            heap.push(record, chunk);
        }

        let mut popped = Vec::new();
        while let Some((record, _)) = heap.pop() {
            popped.push(record);
        }

        assert_eq!(popped, expected);
    }

    #[test]
    fn test_merge_heap_keeps_chunk_tags() {
        let mut heap = MergeHeap::with_capacity(3);
        heap.push(30, 2);
        heap.push(10, 0);
        heap.push(20, 1);

        assert_eq!(heap.peek(), Some(&10));
        assert_eq!(heap.pop(), Some((10, 0)));
        assert_eq!(heap.pop(), Some((20, 1)));
        assert_eq!(heap.pop(), Some((30, 2)));
        assert_eq!(heap.pop(), None);
        assert!(heap.is_empty());
    }
}
