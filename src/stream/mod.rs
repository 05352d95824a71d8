//! Byte-transport endpoints used uniformly by pack and unpack logic.
//!
//! A `PkgStream` is one of a closed set of variants: a file opened for
//! reading or writing, a fixed-size memory-mapped region, or a callback
//! processor with no backing storage. Dispatch is a match on the variant
//! tag; every variant owns its OS resource and releases it exactly once.

mod file;
mod mmap;
mod processor;

pub use file::{FileMode, FileStream};
pub use mmap::MemoryMapStream;
pub use processor::{ProcessorFn, ProcessorStream};

use std::io::SeekFrom;
use std::path::Path;

use crate::{Error, Result};

/// Variant tag reported by every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Read,
    Write,
    MemoryMap,
    Process,
}

pub enum PkgStream {
    File(FileStream),
    MemoryMap(MemoryMapStream),
    Processor(ProcessorStream),
}

impl std::fmt::Debug for PkgStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkgStream::File(_) => f.write_str("PkgStream::File"),
            PkgStream::MemoryMap(_) => f.write_str("PkgStream::MemoryMap"),
            PkgStream::Processor(_) => f.write_str("PkgStream::Processor"),
        }
    }
}

impl PkgStream {
    /// Open an existing file for reading.
    pub fn open_read(path: &Path) -> Result<Self> {
        Ok(PkgStream::File(FileStream::open_read(path)?))
    }

    /// Create (or truncate) a file for writing.
    pub fn create_write(path: &Path) -> Result<Self> {
        Ok(PkgStream::File(FileStream::create_write(path)?))
    }

    /// Create a file-backed memory map of exactly `len` bytes.
    pub fn create_memory_map(path: &Path, len: u64) -> Result<Self> {
        Ok(PkgStream::MemoryMap(MemoryMapStream::create(path, len)?))
    }

    /// Create a callback sink. The closure receives each chunk together
    /// with its offset and a final-chunk marker, synchronously on the
    /// producer's stack.
    pub fn create_processor(identity: impl Into<String>, processor: ProcessorFn) -> Self {
        PkgStream::Processor(ProcessorStream::new(identity, processor))
    }

    pub fn stream_type(&self) -> StreamType {
        match self {
            PkgStream::File(stream) => match stream.mode() {
                FileMode::Read => StreamType::Read,
                FileMode::Write => StreamType::Write,
            },
            PkgStream::MemoryMap(_) => StreamType::MemoryMap,
            PkgStream::Processor(_) => StreamType::Process,
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            PkgStream::File(stream) => stream.identity(),
            PkgStream::MemoryMap(stream) => stream.identity(),
            PkgStream::Processor(stream) => stream.identity(),
        }
    }

    /// Read up to `buf.len()` bytes starting at `offset`. Returns the
    /// exact byte count transferred; never a silent partial failure.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        match self {
            PkgStream::File(stream) => stream.read(buf, offset),
            PkgStream::MemoryMap(stream) => stream.read(buf, offset),
            PkgStream::Processor(_) => Err(Error::InvalidStream(
                "processor stream has no readable storage",
            )),
        }
    }

    /// Write one chunk. `offset` is where the chunk belongs in the
    /// unpacked output; `is_final` marks the last chunk of a transfer so
    /// sinks without a known total length know when to stop.
    pub fn write(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()> {
        match self {
            PkgStream::File(stream) => stream.write(data),
            PkgStream::MemoryMap(stream) => stream.write(data, offset),
            PkgStream::Processor(stream) => stream.write(data, offset, is_final),
        }
    }

    /// Reposition the stream. Seeking before the logical start is an
    /// error, not a clamp. Processor streams accept any seek as a no-op
    /// so codecs can call it unconditionally.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            PkgStream::File(stream) => stream.seek(pos),
            PkgStream::MemoryMap(stream) => stream.seek(pos),
            PkgStream::Processor(_) => Ok(0),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        match self {
            PkgStream::File(stream) => stream.flush(),
            PkgStream::MemoryMap(stream) => stream.flush(),
            PkgStream::Processor(_) => Ok(()),
        }
    }

    /// Zero-copy view of the backing region. Only memory-mapped streams
    /// have one.
    pub fn buffer(&self) -> Result<&[u8]> {
        match self {
            PkgStream::MemoryMap(stream) => Ok(stream.buffer()),
            PkgStream::File(_) => Err(Error::InvalidStream("file stream has no resident buffer")),
            PkgStream::Processor(_) => Err(Error::InvalidStream(
                "processor stream has no resident buffer",
            )),
        }
    }

    pub fn file_len(&self) -> Result<u64> {
        match self {
            PkgStream::File(stream) => stream.file_len(),
            PkgStream::MemoryMap(stream) => Ok(stream.len()),
            PkgStream::Processor(_) => Ok(0),
        }
    }

    /// Flush and release the stream. Consuming the handle makes a double
    /// close unrepresentable; dropping without `close` still releases
    /// the resource.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        if let PkgStream::File(stream) = &self {
            stream.sync()?;
        }
        Ok(())
    }
}
