//! LZ4 frame codec.
//!
//! `block_size_id` indexes the standard LZ4F block-size table; block
//! independence and the content checksum are frame-level flags that
//! change the encoded frame but not the semantic output. The pure-Rust
//! encoder has a single (fast) compression mode, so the carried
//! compression level does not alter the output.

use std::io::Read;

use lz4_flex::frame::{BlockMode, BlockSize, FrameDecoder, FrameEncoder, FrameInfo};

use super::{Chunker, CodecStats, Sink, CHUNK_SIZE};
use crate::info::Lz4Params;
use crate::{Error, Result};

const LZ4_MAX_BLOCK_ID: u8 = 7;

fn block_size(id: u8) -> Result<BlockSize> {
    // Ids below 4 are not in the standard table; LZ4F treats them as the
    // smallest size. Above 7 is rejected.
    match id {
        0 => Ok(BlockSize::Auto),
        1..=4 => Ok(BlockSize::Max64KB),
        5 => Ok(BlockSize::Max256KB),
        6 => Ok(BlockSize::Max1MB),
        7 => Ok(BlockSize::Max4MB),
        _ => Err(Error::InvalidParam("lz4 block size id out of range (0-7)")),
    }
}

pub(crate) fn compress(params: &Lz4Params, src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    if params.block_size_id > LZ4_MAX_BLOCK_ID {
        return Err(Error::InvalidParam("lz4 block size id out of range (0-7)"));
    }
    let info = FrameInfo::new()
        .block_size(block_size(params.block_size_id)?)
        .block_mode(if params.block_independence {
            BlockMode::Independent
        } else {
            BlockMode::Linked
        })
        .content_checksum(params.content_checksum);

    let mut encoder = FrameEncoder::with_frame_info(info, Vec::new());
    std::io::Write::write_all(&mut encoder, src)
        .map_err(|err| Error::Compress(format!("lz4 frame write failed: {err}")))?;
    let packed = encoder
        .finish()
        .map_err(|err| Error::Compress(format!("lz4 frame finish failed: {err}")))?;

    let mut out = Chunker::new(sink);
    for chunk in packed.chunks(CHUNK_SIZE) {
        out.push(chunk)?;
    }
    out.finish()
}

/// Slice reader that tracks how far the frame decoder consumed, so the
/// packed length can be reported even with trailing bytes present.
struct CountingSlice<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Read for CountingSlice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub(crate) fn decompress(src: &[u8], sink: &mut dyn Sink) -> Result<CodecStats> {
    let mut decoder = FrameDecoder::new(CountingSlice { data: src, pos: 0 });
    let mut out = Chunker::new(sink);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|err| Error::Decompress(format!("lz4 frame error: {err}")))?;
        if n == 0 {
            break;
        }
        out.push(&buf[..n])?;
    }
    let produced = out.finish()?;
    Ok(CodecStats {
        consumed: decoder.get_ref().pos as u64,
        produced,
    })
}
