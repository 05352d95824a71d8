//! Gzip codec: deflate payload wrapped in the RFC 1952 header/trailer.
//!
//! The decode path accepts streams from any standard encoder: optional
//! header fields (extra, name, comment, header CRC) are parsed from the
//! fixed-offset flag byte, never inferred, and the trailer CRC32/ISIZE
//! are verified against the produced output.

use super::{zip, Chunker, CodecStats, Sink, CHUNK_SIZE};
use crate::info::ZipParams;
use crate::{Error, Result};

/// Size of the fixed gzip header that precedes any optional fields.
pub const GZIP_BASE_HEADER_SIZE: usize = 10;
/// CRC16 over the gzip header follows the optional fields.
pub const FHCRC: u8 = 0x02;
/// Extra field present.
pub const FEXTRA: u8 = 0x04;
/// Original file name present, NUL-terminated.
pub const FNAME: u8 = 0x08;
/// File comment present, NUL-terminated.
pub const FCOMMENT: u8 = 0x10;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CM_DEFLATE: u8 = 8;
const TRAILER_SIZE: usize = 8;
const OS_UNKNOWN: u8 = 255;

/// Compute the offset at which the deflate payload begins, honoring the
/// header flag bits. Fails with `Decompress` on a truncated or
/// non-gzip header.
pub fn gzip_payload_offset(src: &[u8]) -> Result<usize> {
    if src.len() < GZIP_BASE_HEADER_SIZE {
        return Err(Error::Decompress("gzip header truncated".to_string()));
    }
    if src[0..2] != GZIP_MAGIC {
        return Err(Error::Decompress("not a gzip stream".to_string()));
    }
    if src[2] != CM_DEFLATE {
        return Err(Error::Decompress(format!(
            "unsupported gzip compression method {}",
            src[2]
        )));
    }
    let flags = src[3];
    let mut offset = GZIP_BASE_HEADER_SIZE;
    if flags & FEXTRA != 0 {
        if src.len() < offset + 2 {
            return Err(Error::Decompress("gzip extra field truncated".to_string()));
        }
        let extra_len = u16::from_le_bytes([src[offset], src[offset + 1]]) as usize;
        offset += 2 + extra_len;
    }
    if flags & FNAME != 0 {
        offset = skip_zero_terminated(src, offset, "gzip file name")?;
    }
    if flags & FCOMMENT != 0 {
        offset = skip_zero_terminated(src, offset, "gzip comment")?;
    }
    if flags & FHCRC != 0 {
        offset += 2;
    }
    if offset > src.len() {
        return Err(Error::Decompress("gzip header truncated".to_string()));
    }
    Ok(offset)
}

fn skip_zero_terminated(src: &[u8], offset: usize, what: &str) -> Result<usize> {
    match src[offset.min(src.len())..].iter().position(|&b| b == 0) {
        Some(pos) => Ok(offset + pos + 1),
        None => Err(Error::Decompress(format!("{what} not terminated"))),
    }
}

pub(crate) fn compress(params: &ZipParams, src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    // The wrapper format is fixed; only the deflate parameters apply.
    let mut stream = Vec::with_capacity(GZIP_BASE_HEADER_SIZE + src.len() / 2 + TRAILER_SIZE);
    stream.extend_from_slice(&GZIP_MAGIC);
    stream.push(CM_DEFLATE);
    stream.push(0); // no optional fields
    stream.extend_from_slice(&0u32.to_le_bytes()); // mtime
    stream.push(0); // extra flags
    stream.push(OS_UNKNOWN);

    {
        let mut body = super::IoSink::new(&mut stream);
        zip::deflate(params.level.min(9), false, src, &mut body)?;
    }

    let mut crc = crc32fast::Hasher::new();
    crc.update(src);
    stream.extend_from_slice(&crc.finalize().to_le_bytes());
    stream.extend_from_slice(&(src.len() as u32).to_le_bytes());

    let mut out = Chunker::new(sink);
    for chunk in stream.chunks(CHUNK_SIZE) {
        out.push(chunk)?;
    }
    out.finish()
}

/// Forwards chunks to the destination while accumulating the CRC32 the
/// trailer check needs.
struct CrcSink<'a> {
    inner: &'a mut dyn Sink,
    crc: crc32fast::Hasher,
}

impl Sink for CrcSink<'_> {
    fn push(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()> {
        self.crc.update(data);
        self.inner.push(data, offset, is_final)
    }
}

pub(crate) fn decompress(src: &[u8], sink: &mut dyn Sink) -> Result<CodecStats> {
    let payload_start = gzip_payload_offset(src)?;

    let mut crc_sink = CrcSink {
        inner: sink,
        crc: crc32fast::Hasher::new(),
    };
    let (deflate_len, produced) = zip::inflate(false, &src[payload_start..], &mut crc_sink)?;

    let trailer_start = payload_start + deflate_len as usize;
    if src.len() < trailer_start + TRAILER_SIZE {
        return Err(Error::Decompress("gzip trailer truncated".to_string()));
    }
    let trailer = &src[trailer_start..trailer_start + TRAILER_SIZE];
    let expect_crc = u32::from_le_bytes(trailer[0..4].try_into().expect("slice length"));
    let expect_isize = u32::from_le_bytes(trailer[4..8].try_into().expect("slice length"));

    if crc_sink.crc.finalize() != expect_crc {
        return Err(Error::Decompress("gzip trailer crc mismatch".to_string()));
    }
    if produced as u32 != expect_isize {
        return Err(Error::Decompress("gzip trailer size mismatch".to_string()));
    }

    Ok(CodecStats {
        consumed: (trailer_start + TRAILER_SIZE) as u64,
        produced,
    })
}
