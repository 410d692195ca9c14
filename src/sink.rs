//! Output sink capability.

use std::convert::Infallible;
use std::error::Error;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

/// Output sink interface. The sorter appends records to the sink in ascending
/// order and flushes it once after the last record.
pub trait RecordSink<T> {
    type Error: Error;

    /// Appends a record to the sink.
    fn write(&mut self, record: T) -> Result<(), Self::Error>;

    /// Flushes any buffered records.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Sink writing one record per line to an [`io::Write`] stream.
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        LineSink { writer }
    }

    /// Unwraps the sink returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<T: Display, W: Write> RecordSink<T> for LineSink<W> {
    type Error = io::Error;

    fn write(&mut self, record: T) -> Result<(), Self::Error> {
        writeln!(self.writer, "{}", record)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()
    }
}

/// In-memory sink collecting records into a vector.
impl<T> RecordSink<T> for Vec<T> {
    type Error = Infallible;

    fn write(&mut self, record: T) -> Result<(), Self::Error> {
        self.push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{LineSink, RecordSink};

    #[test]
    fn test_line_sink() {
        let mut sink = LineSink::new(Vec::new());

        RecordSink::write(&mut sink, 1).unwrap();
        RecordSink::write(&mut sink, 2).unwrap();
        RecordSink::<i32>::flush(&mut sink).unwrap();

        assert_eq!(sink.into_inner(), b"1\n2\n");
    }

    #[test]
    fn test_vec_sink() {
        let mut sink = Vec::new();

        sink.write(3).unwrap();
        sink.write(1).unwrap();

        assert_eq!(sink, vec![3, 1]);
    }
}
