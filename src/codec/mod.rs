//! Per-compression-method encode/decode state machines.
//!
//! Codecs pull from a fully resident source buffer and push bounded
//! chunks into a [`Sink`]. The chunking helper lags one chunk behind so
//! the last push carries `is_final = true` exactly once, even when the
//! output is empty. Codec output is bit-identical to a standard
//! implementation of the chosen algorithm.

mod copy;
mod gzip;
mod lz4;
mod zip;

pub use gzip::{gzip_payload_offset, FCOMMENT, FEXTRA, FHCRC, FNAME, GZIP_BASE_HEADER_SIZE};

use std::io::Write;

use crate::info::PackParams;
use crate::stream::PkgStream;
use crate::{Error, Result};

/// Output chunk granularity for all codecs.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Consumed/produced byte counts of one decode. `consumed` is the length
/// of the packed stream actually read from the source buffer, which may
/// be shorter than the buffer (trailing bytes are not the codec's).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecStats {
    pub consumed: u64,
    pub produced: u64,
}

/// Destination for codec output chunks.
pub(crate) trait Sink {
    fn push(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()>;
}

impl Sink for PkgStream {
    fn push(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()> {
        self.write(data, offset, is_final)
    }
}

/// Adapter from any `io::Write` to a [`Sink`]; used when codec output
/// goes straight into the package payload region.
pub(crate) struct IoSink<W: Write> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Sink for IoSink<W> {
    fn push(&mut self, data: &[u8], _offset: u64, _is_final: bool) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }
}

/// One-chunk lag buffer so the final push is marked as such.
pub(crate) struct Chunker<'a> {
    sink: &'a mut dyn Sink,
    pending: Vec<u8>,
    has_pending: bool,
    offset: u64,
}

impl<'a> Chunker<'a> {
    pub(crate) fn new(sink: &'a mut dyn Sink) -> Self {
        Self {
            sink,
            pending: Vec::with_capacity(CHUNK_SIZE),
            has_pending: false,
            offset: 0,
        }
    }

    pub(crate) fn push(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.has_pending {
            self.sink.push(&self.pending, self.offset, false)?;
            self.offset += self.pending.len() as u64;
        }
        self.pending.clear();
        self.pending.extend_from_slice(data);
        self.has_pending = true;
        Ok(())
    }

    /// Emit the held-back chunk with the final marker. Always pushes at
    /// least once so sinks without a known length see the end of stream.
    pub(crate) fn finish(mut self) -> Result<u64> {
        self.sink.push(&self.pending, self.offset, true)?;
        Ok(self.offset + self.pending.len() as u64)
    }
}

/// Compress `src` per the given parameters. Returns the packed size.
pub(crate) fn compress(params: &PackParams, src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    match params {
        PackParams::None => copy::compress(src, sink),
        PackParams::Zip(zip_params) => zip::compress(zip_params, src, sink),
        PackParams::Gzip(zip_params) => gzip::compress(zip_params, src, sink),
        PackParams::Lz4(lz4_params) => lz4::compress(lz4_params, src, sink),
    }
}

/// Decompress a packed stream from the front of `src`. The declared
/// sizes in a descriptor are never treated as binding limits; malformed
/// or truncated input fails with `Decompress`, distinct from I/O errors.
pub(crate) fn decompress(params: &PackParams, src: &[u8], sink: &mut dyn Sink) -> Result<CodecStats> {
    match params {
        PackParams::None => copy::decompress(src, sink),
        PackParams::Zip(zip_params) => zip::decompress(zip_params, src, sink),
        PackParams::Gzip(_) => gzip::decompress(src, sink),
        PackParams::Lz4(_) => lz4::decompress(src, sink),
    }
}
