//! Multi-way external merge sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::buffer::SortBuffer;
use crate::chunk::{ChunkStore, RmpChunkStore};
use crate::merger::MergeHeap;
use crate::scratch::ScratchDir;
use crate::sink::RecordSink;

/// Sorter configuration error.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Record count is zero.
    ZeroRecordCount,
    /// Memory limit is zero.
    ZeroMemoryLimit,
    /// Memory limit exceeds the record count.
    MemoryLimitExceedsRecordCount { record_count: usize, memory_limit: usize },
    /// Record count is not evenly divisible into memory-limit-sized chunks.
    UnevenChunkSplit { record_count: usize, memory_limit: usize },
    /// Memory limit is not evenly divisible into per-chunk quotas.
    UnevenQuota { memory_limit: usize, chunks: usize },
}

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ConfigError::ZeroRecordCount => write!(f, "record count must be positive"),
            ConfigError::ZeroMemoryLimit => write!(f, "memory limit must be positive"),
            ConfigError::MemoryLimitExceedsRecordCount {
                record_count,
                memory_limit,
            } => write!(
                f,
                "memory limit {} exceeds record count {}",
                memory_limit, record_count
            ),
            ConfigError::UnevenChunkSplit {
                record_count,
                memory_limit,
            } => write!(
                f,
                "record count {} is not divisible by memory limit {}",
                record_count, memory_limit
            ),
            ConfigError::UnevenQuota { memory_limit, chunks } => write!(
                f,
                "memory limit {} is not divisible by chunk count {}",
                memory_limit, chunks
            ),
        }
    }
}

/// Sorter initialization error.
#[derive(Debug)]
pub enum BuildError {
    /// Configuration precondition violation.
    Config(ConfigError),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            BuildError::Config(err) => err,
            BuildError::ThreadPoolBuildError(err) => err,
        })
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            BuildError::Config(err) => write!(f, "invalid sorter configuration: {}", err),
            BuildError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
        }
    }
}

/// Sorting error.
#[derive(Debug)]
pub enum SortError<C: Error, I: Error, O: Error> {
    /// Scratch directory creation error.
    Scratch(io::Error),
    /// Chunk store error.
    Chunk(C),
    /// Input data stream error.
    Input(I),
    /// Output sink error.
    Output(O),
    /// The input ran out before all chunks were produced.
    InsufficientChunks { expected: usize, received: usize },
    /// A chunk store or the merge bookkeeping delivered fewer records than
    /// the protocol demanded.
    InsufficientValues {
        chunk: Option<usize>,
        expected: usize,
        received: usize,
    },
    /// Scratch directory removal error. The sorted output is already complete
    /// and flushed when this is returned; only the scratch area is left behind.
    Cleanup(io::Error),
}

impl<C, I, O> Error for SortError<C, I, O>
where
    C: Error + 'static,
    I: Error + 'static,
    O: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Scratch(err) | SortError::Cleanup(err) => Some(err),
            SortError::Chunk(err) => Some(err),
            SortError::Input(err) => Some(err),
            SortError::Output(err) => Some(err),
            SortError::InsufficientChunks { .. } | SortError::InsufficientValues { .. } => None,
        }
    }
}

impl<C: Error, I: Error, O: Error> Display for SortError<C, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Scratch(err) => write!(f, "scratch directory not created: {}", err),
            SortError::Chunk(err) => write!(f, "chunk store operation failed: {}", err),
            SortError::Input(err) => write!(f, "input data stream error: {}", err),
            SortError::Output(err) => write!(f, "output sink error: {}", err),
            SortError::InsufficientChunks { expected, received } => write!(
                f,
                "insufficient chunks read from input: expected {}, received {}",
                expected, received
            ),
            SortError::InsufficientValues {
                chunk: Some(chunk),
                expected,
                received,
            } => write!(
                f,
                "insufficient values read from chunk {}: expected {}, received {}",
                chunk, expected, received
            ),
            SortError::InsufficientValues {
                chunk: None,
                expected,
                received,
            } => write!(
                f,
                "insufficient values read from heap: expected {}, received {}",
                expected, received
            ),
            SortError::Cleanup(err) => write!(f, "scratch directory not removed: {}", err),
        }
    }
}

/// Multi-way sorter builder. Provides methods for [`MwaySorter`] initialization.
#[derive(Clone)]
pub struct MwaySorterBuilder<T, C = RmpChunkStore<T>>
where
    C: ChunkStore<T>,
{
    /// Total number of records to sort.
    record_count: usize,
    /// Maximum number of records held in memory at any time.
    memory_limit: usize,
    /// Directory to be used to store intermediate chunk data.
    scratch_dir: Option<Box<Path>>,
    /// Number of threads to be used to sort chunk buffers in parallel.
    threads_number: Option<usize>,
    /// Chunk store read/write buffer size.
    rw_buf_size: Option<usize>,

    /// Chunk store type.
    chunk_store_type: PhantomData<C>,
    /// Record type.
    record_type: PhantomData<T>,
}

impl<T, C> MwaySorterBuilder<T, C>
where
    C: ChunkStore<T>,
{
    /// Creates an instance of a builder for a sorter of `record_count` records
    /// bounded by a working set of `memory_limit` records.
    pub fn new(record_count: usize, memory_limit: usize) -> Self {
        MwaySorterBuilder {
            record_count,
            memory_limit,
            scratch_dir: None,
            threads_number: None,
            rw_buf_size: None,
            chunk_store_type: PhantomData,
            record_type: PhantomData,
        }
    }

    /// Builds an [`MwaySorter`] instance using provided configuration.
    pub fn build(self) -> Result<MwaySorter<T, C>, BuildError> {
        MwaySorter::new(
            self.record_count,
            self.memory_limit,
            self.scratch_dir.as_deref(),
            self.threads_number,
            self.rw_buf_size,
        )
    }

    /// Sets directory to be used to store intermediate chunk data.
    pub fn with_scratch_dir(mut self, path: &Path) -> MwaySorterBuilder<T, C> {
        self.scratch_dir = Some(path.into());
        return self;
    }

    /// Sets number of threads to be used to sort chunk buffers in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> MwaySorterBuilder<T, C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets chunk store read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> MwaySorterBuilder<T, C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

/// Multi-way external merge sorter.
///
/// Sorts `m` records using at most `k` records of working memory. The input is
/// split into `p = m/k` chunks of `k` records, each sorted in memory and
/// persisted to its own chunk store. The stores are then merged through a
/// min-heap seeded with `q = k/p` records per chunk and refilled from a
/// chunk's store each time its in-heap batch is fully consumed, so the heap
/// holds exactly `k` records while every chunk is still active.
pub struct MwaySorter<T, C = RmpChunkStore<T>>
where
    C: ChunkStore<T>,
{
    /// Buffer sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store intermediate chunk data.
    scratch_dir: Option<PathBuf>,
    /// Chunk store read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Total number of records to sort (`m`).
    record_count: usize,
    /// Maximum number of records held in memory at any time (`k`).
    memory_limit: usize,
    /// Number of chunks the input is split into (`p = m/k`).
    chunks: usize,
    /// Number of records pulled into the heap per chunk refill (`q = k/p`).
    quota: usize,

    /// Chunk store type.
    chunk_store_type: PhantomData<C>,
    /// Record type.
    record_type: PhantomData<T>,
}

impl<T, C> MwaySorter<T, C>
where
    C: ChunkStore<T>,
{
    /// Creates a new multi-way sorter instance.
    ///
    /// # Arguments
    /// * `record_count` - Total number of records to sort.
    /// * `memory_limit` - Maximum number of records held in memory at any time.
    ///   Must divide `record_count` evenly, and the derived chunk count must
    ///   divide it evenly in turn.
    /// * `scratch_dir` - Directory to be used to store intermediate chunk data.
    ///   If the parameter is [`None`] a unique directory inside the default OS
    ///   temporary directory is used.
    /// * `threads_number` - Number of threads to be used to sort chunk buffers
    ///   in parallel. If the parameter is [`None`] threads number will be
    ///   selected based on available CPU core number.
    /// * `rw_buf_size` - Chunk store read/write buffer size.
    pub fn new(
        record_count: usize,
        memory_limit: usize,
        scratch_dir: Option<&Path>,
        threads_number: Option<usize>,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, BuildError> {
        let (chunks, quota) = Self::check_config(record_count, memory_limit).map_err(BuildError::Config)?;

        return Ok(MwaySorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            scratch_dir: scratch_dir.map(|path| path.to_path_buf()),
            rw_buf_size,
            record_count,
            memory_limit,
            chunks,
            quota,
            chunk_store_type: PhantomData,
            record_type: PhantomData,
        });
    }

    /// Validates the even-division preconditions and derives the chunk count
    /// and per-chunk quota. No rounding policy exists for uneven divisions.
    fn check_config(record_count: usize, memory_limit: usize) -> Result<(usize, usize), ConfigError> {
        if record_count == 0 {
            return Err(ConfigError::ZeroRecordCount);
        }
        if memory_limit == 0 {
            return Err(ConfigError::ZeroMemoryLimit);
        }
        if memory_limit > record_count {
            return Err(ConfigError::MemoryLimitExceedsRecordCount {
                record_count,
                memory_limit,
            });
        }
        if record_count % memory_limit != 0 {
            return Err(ConfigError::UnevenChunkSplit {
                record_count,
                memory_limit,
            });
        }

        let chunks = record_count / memory_limit;
        if memory_limit % chunks != 0 {
            return Err(ConfigError::UnevenQuota { memory_limit, chunks });
        }

        return Ok((chunks, memory_limit / chunks));
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, BuildError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(BuildError::ThreadPoolBuildError)?;

        return Ok(thread_pool);
    }

    /// Number of records each chunk store holds (`m/p`).
    fn records_per_chunk(&self) -> usize {
        self.record_count / self.chunks
    }

    /// Sorts data from the input into the output sink.
    ///
    /// Runs the split phase, the heap-based merge phase, and the scratch
    /// teardown to completion before returning. The scratch directory is
    /// removed on every exit path; on a failed run the sink's partial contents
    /// are undefined and must not be treated as valid.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from. Exactly the
    ///   configured number of records is consumed; surplus items are ignored.
    /// * `output` - Sink the sorted records are appended to.
    pub fn sort<I, E, S>(&self, input: I, output: &mut S) -> Result<(), SortError<C::Error, E, S::Error>>
    where
        T: Ord + Send,
        E: Error,
        I: IntoIterator<Item = Result<T, E>>,
        S: RecordSink<T>,
    {
        log::info!(
            "sorting {} records with a working set of {} ({} chunks, quota {})",
            self.record_count,
            self.memory_limit,
            self.chunks,
            self.quota
        );

        let scratch = ScratchDir::create(self.scratch_dir.as_deref()).map_err(SortError::Scratch)?;

        let mut stores = self.split_and_sort_chunks(input, &scratch)?;
        let (mut heap, mut chunks_read) = self.init_heap(&mut stores)?;
        self.merge(&mut stores, &mut heap, &mut chunks_read, output)?;

        scratch.close().map_err(SortError::Cleanup)?;

        return Ok(());
    }

    /// Drains the input into sorted, sealed chunk stores inside the scratch
    /// area. Stops consuming input once all chunks are produced.
    fn split_and_sort_chunks<I, E, O>(
        &self,
        input: I,
        scratch: &ScratchDir,
    ) -> Result<Vec<C>, SortError<C::Error, E, O>>
    where
        T: Ord + Send,
        E: Error,
        O: Error,
        I: IntoIterator<Item = Result<T, E>>,
    {
        let mut buffer = SortBuffer::new(self.memory_limit);
        let mut stores: Vec<C> = Vec::with_capacity(self.chunks);

        for item in input.into_iter() {
            match item {
                Ok(record) => buffer.push(record),
                Err(err) => return Err(SortError::Input(err)),
            }

            if buffer.is_full() {
                stores.push(self.create_chunk(&mut buffer, scratch, stores.len())?);
                if stores.len() == self.chunks {
                    break; // surplus input is ignored
                }
            }
        }

        if stores.len() != self.chunks {
            return Err(SortError::InsufficientChunks {
                expected: self.chunks,
                received: stores.len(),
            });
        }

        log::debug!("split phase done ({} chunks)", self.chunks);

        return Ok(stores);
    }

    fn create_chunk<E, O>(
        &self,
        buffer: &mut SortBuffer<T>,
        scratch: &ScratchDir,
        chunk: usize,
    ) -> Result<C, SortError<C::Error, E, O>>
    where
        T: Ord + Send,
        E: Error,
        O: Error,
    {
        log::debug!("sorting chunk {} data ...", chunk);
        self.thread_pool.install(|| buffer.par_sort());

        log::debug!("saving chunk {} data", chunk);
        let mut store = C::create(&scratch.chunk_path(chunk), self.rw_buf_size).map_err(SortError::Chunk)?;
        for record in buffer.drain() {
            store.append(&record).map_err(SortError::Chunk)?;
        }
        store.rewind().map_err(SortError::Chunk)?;

        return Ok(store);
    }

    /// Seeds the merge heap with a quota of records from every chunk and
    /// zeroes the per-chunk read counters.
    fn init_heap<E, O>(&self, stores: &mut [C]) -> Result<(MergeHeap<T>, Vec<usize>), SortError<C::Error, E, O>>
    where
        T: Ord,
        E: Error,
        O: Error,
    {
        let mut heap = MergeHeap::with_capacity(self.memory_limit);
        let mut chunks_read = Vec::with_capacity(self.chunks);

        for chunk in 0..self.chunks {
            self.load_chunk(stores, &mut heap, chunk, 0)?;
            chunks_read.push(0);
        }

        if heap.len() != self.memory_limit {
            return Err(SortError::InsufficientValues {
                chunk: None,
                expected: self.memory_limit,
                received: heap.len(),
            });
        }

        return Ok((heap, chunks_read));
    }

    /// Reads up to a quota of records from the chunk's store, resuming at its
    /// cursor, and pushes each into the heap tagged with the chunk id. A short
    /// read is an error unless it exactly consumes the chunk.
    fn load_chunk<E, O>(
        &self,
        stores: &mut [C],
        heap: &mut MergeHeap<T>,
        chunk: usize,
        already_read: usize,
    ) -> Result<(), SortError<C::Error, E, O>>
    where
        T: Ord,
        E: Error,
        O: Error,
    {
        let mut count = 0;
        while count < self.quota {
            match stores[chunk].read_next().map_err(SortError::Chunk)? {
                Some(record) => {
                    heap.push(record, chunk);
                    count += 1;
                }
                None => break,
            }
        }

        if count < self.quota && already_read + count < self.records_per_chunk() {
            return Err(SortError::InsufficientValues {
                chunk: Some(chunk),
                expected: self.quota,
                received: count,
            });
        }

        return Ok(());
    }

    /// Pops minima into the sink, refilling a chunk's quota whenever its
    /// counter hits an exact multiple of the quota with records still unread,
    /// then verifies that exactly the configured number of records was merged.
    fn merge<E, S>(
        &self,
        stores: &mut [C],
        heap: &mut MergeHeap<T>,
        chunks_read: &mut [usize],
        output: &mut S,
    ) -> Result<(), SortError<C::Error, E, S::Error>>
    where
        T: Ord,
        E: Error,
        S: RecordSink<T>,
    {
        let records_per_chunk = self.records_per_chunk();

        while let Some((record, chunk)) = heap.pop() {
            output.write(record).map_err(SortError::Output)?;

            chunks_read[chunk] += 1;
            if chunks_read[chunk] % self.quota == 0 && chunks_read[chunk] < records_per_chunk {
                self.load_chunk(stores, heap, chunk, chunks_read[chunk])?;
            }
        }
        output.flush().map_err(SortError::Output)?;

        let total: usize = chunks_read.iter().sum();
        if total != self.record_count {
            return Err(SortError::InsufficientValues {
                chunk: None,
                expected: self.record_count,
                received: total,
            });
        }

        log::debug!("merge phase done ({} records)", total);

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::path::PathBuf;

    use rand::prelude::*;
    use rstest::*;

    use super::{BuildError, MwaySorter, MwaySorterBuilder, SortError};

    fn ok_input(values: Vec<i64>) -> Vec<Result<i64, io::Error>> {
        Vec::from_iter(values.into_iter().map(Ok))
    }

    fn scratch_location(parent: &tempfile::TempDir) -> PathBuf {
        parent.path().join("scratch")
    }

    #[rstest]
    #[case(vec![9, 1, 4, 7, 2, 8, 3, 6, 5, 11, 10, 12], 6)]
    #[case(vec![5, 5, 1, 1, 3, 3, 2, 2], 4)] // duplicates across chunks
    #[case(vec![8, 7, 6, 5, 4, 3, 2, 1], 8)] // single chunk, no refills
    #[case(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], 6)] // already sorted
    fn test_sort(#[case] input: Vec<i64>, #[case] memory_limit: usize) {
        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_location(&parent);

        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(input.len(), memory_limit)
            .with_scratch_dir(&scratch)
            .with_threads_number(2)
            .build()
            .unwrap();

        let mut expected = input.clone();
        expected.sort();

        let mut output = Vec::new();
        sorter.sort(ok_input(input), &mut output).unwrap();

        assert_eq!(output, expected);
        assert!(!scratch.exists(), "scratch directory must be removed");
    }

    #[test]
    fn test_sort_random_large() {
        let record_count = 100_000;
        let memory_limit = 10_000;

        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_location(&parent);

        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(record_count, memory_limit)
            .with_scratch_dir(&scratch)
            .build()
            .unwrap();

        let mut rng = rand::thread_rng();
        let input: Vec<i64> = Vec::from_iter((0..record_count).map(|_| rng.gen()));

        let mut expected = input.clone();
        expected.sort();

        let mut output = Vec::new();
        sorter.sort(ok_input(input), &mut output).unwrap();

        assert_eq!(output.len(), record_count);
        assert_eq!(output, expected);
        assert!(!scratch.exists());
    }

    #[test]
    fn test_sort_ignores_surplus_input() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_location(&parent);

        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(4, 2)
            .with_scratch_dir(&scratch)
            .build()
            .unwrap();

        let mut output = Vec::new();
        sorter
            .sort(ok_input(vec![4, 3, 2, 1, 100, 200]), &mut output)
            .unwrap();

        assert_eq!(output, vec![1, 2, 3, 4]);
        assert!(!scratch.exists());
    }

    #[test]
    fn test_sort_fails_on_short_input() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_location(&parent);

        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(12, 6)
            .with_scratch_dir(&scratch)
            .build()
            .unwrap();

        let mut output = Vec::new();
        let err = sorter
            .sort(ok_input(vec![9, 1, 4, 7, 2, 8, 3, 6, 5]), &mut output)
            .unwrap_err();

        assert!(matches!(
            err,
            SortError::InsufficientChunks {
                expected: 2,
                received: 1,
            }
        ));
        assert!(!scratch.exists(), "scratch directory must be removed on failure");
    }

    #[test]
    fn test_sort_propagates_input_error() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_location(&parent);

        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(4, 2)
            .with_scratch_dir(&scratch)
            .build()
            .unwrap();

        let input = vec![
            Ok(3),
            Ok(1),
            Err(io::Error::new(io::ErrorKind::Other, "broken stream")),
            Ok(2),
        ];

        let mut output = Vec::new();
        let err = sorter.sort(input, &mut output).unwrap_err();

        assert!(matches!(err, SortError::Input(_)));
        assert!(!scratch.exists(), "scratch directory must be removed on failure");
    }

    #[rstest]
    #[case(0, 1)] // zero record count
    #[case(10, 0)] // zero memory limit
    #[case(4, 8)] // memory limit exceeds record count
    #[case(10, 4)] // record count not divisible by memory limit
    #[case(12, 4)] // quota k/p not integral (p=3)
    fn test_build_rejects_invalid_config(#[case] record_count: usize, #[case] memory_limit: usize) {
        let result: Result<MwaySorter<i64>, _> = MwaySorterBuilder::new(record_count, memory_limit).build();

        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[test]
    fn test_sort_uses_default_scratch_dir() {
        let sorter: MwaySorter<i64> = MwaySorterBuilder::new(4, 2).build().unwrap();

        let mut output = Vec::new();
        sorter.sort(ok_input(vec![4, 3, 2, 1]), &mut output).unwrap();

        assert_eq!(output, vec![1, 2, 3, 4]);
    }
}
