//! Deflate codec (zlib parameter set).
//!
//! Negative `window_bits` selects a raw, headerless stream; zero or
//! positive adds the zlib wrapper. Runs the flate2 state machines
//! directly so output is pushed in bounded chunks as it is produced.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::{Chunker, CodecStats, Sink, CHUNK_SIZE};
use crate::info::ZipParams;
use crate::{Error, Result};

const ZIP_METHOD_DEFLATE: i32 = 8;
const ZIP_MAX_LEVEL: u32 = 9;
const MAX_WINDOW_BITS: i32 = 15;

fn validate(params: &ZipParams) -> Result<()> {
    if params.method != ZIP_METHOD_DEFLATE {
        return Err(Error::InvalidParam("zip method must be deflate (8)"));
    }
    if params.level > ZIP_MAX_LEVEL {
        return Err(Error::InvalidParam("zip level out of range (0-9)"));
    }
    if params.window_bits > MAX_WINDOW_BITS || params.window_bits < -MAX_WINDOW_BITS {
        return Err(Error::InvalidParam("zip window bits out of range"));
    }
    Ok(())
}

pub(crate) fn compress(params: &ZipParams, src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    validate(params)?;
    deflate(params.level, params.window_bits >= 0, src, sink)
}

pub(crate) fn decompress(params: &ZipParams, src: &[u8], sink: &mut dyn Sink) -> Result<CodecStats> {
    validate(params)?;
    let (consumed, produced) = inflate(params.window_bits >= 0, src, sink)?;
    Ok(CodecStats { consumed, produced })
}

/// Deflate `src`, pushing output chunks as they are produced. Returns
/// the packed size.
pub(super) fn deflate(level: u32, zlib_wrapper: bool, src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    let mut state = Compress::new(Compression::new(level), zlib_wrapper);
    let mut out = Chunker::new(sink);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let consumed = state.total_in() as usize;
        let before_out = state.total_out();
        let status = state
            .compress(&src[consumed..], &mut buf, FlushCompress::Finish)
            .map_err(|err| Error::Compress(err.to_string()))?;
        let produced = (state.total_out() - before_out) as usize;
        out.push(&buf[..produced])?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if produced == 0 && state.total_in() as usize == src.len() {
                    return Err(Error::Compress("deflate made no progress".to_string()));
                }
            }
        }
    }
    out.finish()
}

/// Inflate a deflate stream from the front of `src`. Returns
/// `(consumed, produced)`; bytes past the end of the stream are left
/// untouched.
pub(super) fn inflate(zlib_wrapper: bool, src: &[u8], sink: &mut dyn Sink) -> Result<(u64, u64)> {
    let mut state = Decompress::new(zlib_wrapper);
    let mut out = Chunker::new(sink);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let consumed = state.total_in() as usize;
        let before_out = state.total_out();
        let status = state
            .decompress(&src[consumed..], &mut buf, FlushDecompress::Finish)
            .map_err(|err| Error::Decompress(err.to_string()))?;
        let produced = (state.total_out() - before_out) as usize;
        out.push(&buf[..produced])?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if produced == 0 && state.total_in() as usize == src.len() {
                    return Err(Error::Decompress("truncated deflate stream".to_string()));
                }
            }
        }
    }
    let produced = out.finish()?;
    Ok((state.total_in(), produced))
}
