//! Chunk store capability and its file-backed implementation.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;

/// Chunk store error.
#[derive(Debug)]
pub enum ChunkStoreError {
    /// Chunk file I/O error.
    IO(io::Error),
    /// Record serialization error.
    SerializationError(rmp_serde::encode::Error),
    /// Record deserialization error.
    DeserializationError(rmp_serde::decode::Error),
}

impl Error for ChunkStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            ChunkStoreError::IO(err) => err,
            ChunkStoreError::SerializationError(err) => err,
            ChunkStoreError::DeserializationError(err) => err,
        })
    }
}

impl Display for ChunkStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ChunkStoreError::IO(err) => write!(f, "chunk file I/O operation failed: {}", err),
            ChunkStoreError::SerializationError(err) => write!(f, "record serialization error: {}", err),
            ChunkStoreError::DeserializationError(err) => write!(f, "record deserialization error: {}", err),
        }
    }
}

impl From<io::Error> for ChunkStoreError {
    fn from(err: io::Error) -> Self {
        ChunkStoreError::IO(err)
    }
}

impl From<rmp_serde::encode::Error> for ChunkStoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ChunkStoreError::SerializationError(err)
    }
}

impl From<rmp_serde::decode::Error> for ChunkStoreError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ChunkStoreError::DeserializationError(err)
    }
}

/// Chunk store interface. A store is written once by sequential appends,
/// sealed and rewound, and then consumed by sequential reads. The read cursor
/// persists between [`ChunkStore::read_next`] calls, so a store can be drained
/// in several slices over the course of a merge.
pub trait ChunkStore<T>: Sized {
    type Error: Error;

    /// Creates an empty chunk store backed by `path`.
    fn create(path: &Path, buf_size: Option<usize>) -> Result<Self, Self::Error>;

    /// Appends a record to the store.
    fn append(&mut self, record: &T) -> Result<(), Self::Error>;

    /// Seals the store (flushes pending writes) and positions the read cursor
    /// at the first record.
    fn rewind(&mut self) -> Result<(), Self::Error>;

    /// Reads the next record, advancing the cursor.
    /// Returns [`None`] when the store is exhausted.
    fn read_next(&mut self) -> Result<Option<T>, Self::Error>;
}

enum Backing {
    Writing(io::BufWriter<fs::File>),
    Reading(io::Take<io::BufReader<fs::File>>),
}

/// RMP (Rust MessagePack) chunk store implementation.
/// Records are persisted to a single file in MessagePack format.
/// For more information see <https://msgpack.org/>.
pub struct RmpChunkStore<T> {
    file: fs::File,
    backing: Backing,
    buf_size: Option<usize>,

    item_type: PhantomData<T>,
}

impl<T> ChunkStore<T> for RmpChunkStore<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Error = ChunkStoreError;

    fn create(path: &Path, buf_size: Option<usize>) -> Result<Self, Self::Error> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file.try_clone()?),
            None => io::BufWriter::new(file.try_clone()?),
        };

        return Ok(RmpChunkStore {
            file,
            backing: Backing::Writing(writer),
            buf_size,
            item_type: PhantomData,
        });
    }

    fn append(&mut self, record: &T) -> Result<(), Self::Error> {
        match &mut self.backing {
            Backing::Writing(writer) => {
                rmp_serde::encode::write(writer, record)?;
                Ok(())
            }
            Backing::Reading(_) => Err(ChunkStoreError::IO(io::Error::new(
                io::ErrorKind::Other,
                "chunk store is sealed",
            ))),
        }
    }

    fn rewind(&mut self) -> Result<(), Self::Error> {
        if let Backing::Writing(writer) = &mut self.backing {
            writer.flush()?;
        }

        let file_len = self.file.metadata()?.len();

        let mut reader = match self.buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, self.file.try_clone()?),
            None => io::BufReader::new(self.file.try_clone()?),
        };
        reader.rewind()?;

        self.backing = Backing::Reading(reader.take(file_len));

        return Ok(());
    }

    fn read_next(&mut self) -> Result<Option<T>, Self::Error> {
        match &mut self.backing {
            Backing::Reading(reader) => {
                if reader.limit() == 0 {
                    Ok(None)
                } else {
                    Ok(Some(rmp_serde::decode::from_read(&mut *reader)?))
                }
            }
            Backing::Writing(_) => Err(ChunkStoreError::IO(io::Error::new(
                io::ErrorKind::Other,
                "chunk store is not sealed",
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ChunkStore, RmpChunkStore};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_rmp_chunk_store_round_trip(tmp_dir: tempfile::TempDir) {
        let saved = Vec::from_iter(0..100);

        let mut store: RmpChunkStore<i32> = ChunkStore::create(&tmp_dir.path().join("chunk-0"), None).unwrap();
        for record in &saved {
            store.append(record).unwrap();
        }
        store.rewind().unwrap();

        let mut restored = Vec::new();
        while let Some(record) = store.read_next().unwrap() {
            restored.push(record);
        }

        assert_eq!(restored, saved);
        // exhausted store keeps yielding None
        assert!(store.read_next().unwrap().is_none());
    }

    #[rstest]
    fn test_rmp_chunk_store_incremental_reads(tmp_dir: tempfile::TempDir) {
        let mut store: RmpChunkStore<i32> = ChunkStore::create(&tmp_dir.path().join("chunk-0"), Some(64)).unwrap();
        for record in 0..6 {
            store.append(&record).unwrap();
        }
        store.rewind().unwrap();

        for expected in 0..3 {
            assert_eq!(store.read_next().unwrap(), Some(expected));
        }
        // cursor persists across read slices
        for expected in 3..6 {
            assert_eq!(store.read_next().unwrap(), Some(expected));
        }
        assert!(store.read_next().unwrap().is_none());
    }

    #[rstest]
    fn test_rmp_chunk_store_sealed_rejects_append(tmp_dir: tempfile::TempDir) {
        let mut store: RmpChunkStore<i32> = ChunkStore::create(&tmp_dir.path().join("chunk-0"), None).unwrap();
        store.append(&1).unwrap();
        store.rewind().unwrap();

        assert!(store.append(&2).is_err());
    }

    #[rstest]
    fn test_rmp_chunk_store_unsealed_rejects_read(tmp_dir: tempfile::TempDir) {
        let mut store: RmpChunkStore<i32> = ChunkStore::create(&tmp_dir.path().join("chunk-0"), None).unwrap();
        store.append(&1).unwrap();

        assert!(store.read_next().is_err());
    }
}
