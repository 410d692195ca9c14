//! Bounded in-memory sort buffer.

use rayon::slice::ParallelSliceMut;

/// Record buffer limited by element count. The split phase fills it to
/// capacity, sorts it in place and drains it into a chunk store.
pub struct SortBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T: Send> SortBuffer<T> {
    /// Creates a buffer that holds at most `limit` records.
    /// Storage is preallocated since the buffer is always filled to the limit.
    pub fn new(limit: usize) -> Self {
        SortBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a record to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks whether the buffer reached its limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts the buffered records ascending. Should be called inside a rayon
    /// thread pool to control the parallelism degree.
    pub fn par_sort(&mut self)
    where
        T: Ord,
    {
        self.inner.as_mut_slice().par_sort_unstable();
    }

    /// Drains the buffer leaving it empty with its capacity intact.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.inner.drain(..)
    }
}

#[cfg(test)]
mod test {
    use super::SortBuffer;

    #[test]
    fn test_sort_buffer() {
        let mut buffer = SortBuffer::new(3);

        buffer.push(2);
        buffer.push(0);
        assert_eq!(buffer.is_full(), false);
        buffer.push(1);
        assert_eq!(buffer.is_full(), true);
        assert_eq!(buffer.len(), 3);

        buffer.par_sort();
        let data = Vec::from_iter(buffer.drain());
        assert_eq!(data, vec![0, 1, 2]);

        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.is_full(), false);
    }
}
