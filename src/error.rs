use thiserror::Error;

/// Error taxonomy for the package engine.
///
/// `InvalidFile` and `SignatureInvalid` carry owned strings because they
/// usually name a path or identity; the remaining variants describe fixed
/// contract violations and stay `&'static str`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
    #[error("invalid file: {0}")]
    InvalidFile(String),
    #[error("invalid stream: {0}")]
    InvalidStream(&'static str),
    #[error("compression failed: {0}")]
    Compress(String),
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("digest mismatch for component {identity}")]
    DigestMismatch { identity: String },
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
