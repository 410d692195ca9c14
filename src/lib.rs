//! `mway-sort` is a bounded-memory multi-way external merge sort implementation.
//!
//! External sorting is required when the data being sorted does not fit into the main memory (RAM)
//! of a computer. `mway-sort` sorts `m` fixed-size records using at most `k` records of working
//! memory at any time. Sorting is achieved in two passes: during the first pass the input is split
//! into `p = m/k` chunks that each fit in memory, sorted and persisted to their own chunk stores;
//! during the second pass the stores are merged through a min-heap that holds `q = k/p` records per
//! chunk, refilled from a chunk's store each time its in-heap batch is consumed. The intermediate
//! storage is removed when the sort finishes, on every exit path.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `mway-sort` supports the following features:
//!
//! * **Data agnostic:**
//!   it supports all totally-ordered data types that implement `serde` serialization/deserialization
//!   by default, otherwise you can implement your own chunk store backing.
//! * **Bounded working set:**
//!   no more than `k` records are resident at any time — one `k`-record sort buffer during the split
//!   phase, one `k`-entry heap during the merge phase.
//! * **Fail-fast preconditions:**
//!   `m` must divide evenly into `k`-sized chunks and `k` into per-chunk quotas; violations are
//!   rejected at build time instead of silently truncating.
//! * **Guaranteed teardown:**
//!   the intermediate chunk storage is created at sort start and removed when the sort completes,
//!   fails, or is abandoned.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::{self, prelude::*};
//! use std::path;
//!
//! use mway_sort::{LineSink, MwaySorter, MwaySorterBuilder};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter: MwaySorter<i64> = MwaySorterBuilder::new(1_000_000, 10_000)
//!         .with_scratch_dir(path::Path::new("./scratch"))
//!         .build()
//!         .unwrap();
//!
//!     let input = input_reader.lines().map(|line| {
//!         line.and_then(|line| {
//!             line.trim()
//!                 .parse::<i64>()
//!                 .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
//!         })
//!     });
//!
//!     let mut output = LineSink::new(output_writer);
//!     sorter.sort(input, &mut output).unwrap();
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod merger;
pub mod scratch;
pub mod sink;
pub mod sort;

pub use buffer::SortBuffer;
pub use chunk::{ChunkStore, ChunkStoreError, RmpChunkStore};
pub use merger::MergeHeap;
pub use scratch::ScratchDir;
pub use sink::{LineSink, RecordSink};
pub use sort::{BuildError, ConfigError, MwaySorter, MwaySorterBuilder, SortError};
