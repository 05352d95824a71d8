//! Pass-through codec: `packed_size == unpacked_size` always.

use super::{Chunker, CodecStats, Sink, CHUNK_SIZE};
use crate::Result;

pub(super) fn compress(src: &[u8], sink: &mut dyn Sink) -> Result<u64> {
    let mut out = Chunker::new(sink);
    for chunk in src.chunks(CHUNK_SIZE) {
        out.push(chunk)?;
    }
    out.finish()
}

pub(super) fn decompress(src: &[u8], sink: &mut dyn Sink) -> Result<CodecStats> {
    let produced = compress(src, sink)?;
    Ok(CodecStats {
        consumed: src.len() as u64,
        produced,
    })
}
