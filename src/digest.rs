//! Component digest computation (CRC32 and SHA-256).
//!
//! Digests always cover the *unpacked* bytes of a component. They are
//! computed once at pack time and recomputed during extraction; any
//! mismatch is a hard integrity failure.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::info::DigestMethod;
use crate::{Error, Result};

/// Chunk size for streaming digest computation over files.
const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental digest state for one component.
pub enum DigestState {
    None,
    Crc32(crc32fast::Hasher),
    Sha256(Sha256),
}

impl DigestState {
    pub fn new(method: DigestMethod) -> Self {
        match method {
            DigestMethod::None => DigestState::None,
            DigestMethod::Crc32 => DigestState::Crc32(crc32fast::Hasher::new()),
            DigestMethod::Sha256 => DigestState::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::None => {}
            DigestState::Crc32(hasher) => hasher.update(data),
            DigestState::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finish the digest. CRC32 is emitted as 4 little-endian bytes to
    /// match the rest of the wire format; `None` yields an empty buffer.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            DigestState::None => Vec::new(),
            DigestState::Crc32(hasher) => hasher.finalize().to_le_bytes().to_vec(),
            DigestState::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }
}

/// Digest a fully resident buffer.
pub fn compute(method: DigestMethod, data: &[u8]) -> Vec<u8> {
    let mut state = DigestState::new(method);
    state.update(data);
    state.finalize()
}

/// Digest a source file in bounded chunks.
pub fn build_file_digest(method: DigestMethod, path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)
        .map_err(|err| Error::InvalidFile(format!("{}: {err}", path.display())))?;
    let mut state = DigestState::new(method);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
    }
    Ok(state.finalize())
}
