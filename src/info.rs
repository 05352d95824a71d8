//! Package and component descriptors plus the codec parameter sets that
//! travel with them while packing.

use crate::{Error, Result};

/// Container flavor recorded in the package header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgType {
    Upgrade,
    Zip,
    Gzip,
    Lz4,
}

impl PkgType {
    pub fn to_u8(self) -> u8 {
        match self {
            PkgType::Upgrade => 0,
            PkgType::Zip => 1,
            PkgType::Gzip => 2,
            PkgType::Lz4 => 3,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PkgType::Upgrade),
            1 => Ok(PkgType::Zip),
            2 => Ok(PkgType::Gzip),
            3 => Ok(PkgType::Lz4),
            _ => Err(Error::InvalidFile(format!("unknown package type {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMethod {
    None,
    Crc32,
    Sha256,
}

impl DigestMethod {
    /// Size of the digest this method produces, in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            DigestMethod::None => 0,
            DigestMethod::Crc32 => 4,
            DigestMethod::Sha256 => 32,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            DigestMethod::None => 0,
            DigestMethod::Crc32 => 1,
            DigestMethod::Sha256 => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DigestMethod::None),
            1 => Ok(DigestMethod::Crc32),
            2 => Ok(DigestMethod::Sha256),
            _ => Err(Error::InvalidFile(format!("unknown digest method {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMethod {
    None,
    Rsa,
}

impl SignMethod {
    pub fn to_u8(self) -> u8 {
        match self {
            SignMethod::None => 0,
            SignMethod::Rsa => 1,
        }
    }

    /// An unknown sign method on disk is rejected as a signature failure,
    /// not silently accepted.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SignMethod::None),
            1 => Ok(SignMethod::Rsa),
            _ => Err(Error::SignatureInvalid(format!(
                "unknown sign method {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMethod {
    None,
    Zip,
    Gzip,
    Lz4,
}

impl PackMethod {
    pub fn to_u8(self) -> u8 {
        match self {
            PackMethod::None => 0,
            PackMethod::Zip => 1,
            PackMethod::Gzip => 2,
            PackMethod::Lz4 => 3,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PackMethod::None),
            1 => Ok(PackMethod::Zip),
            2 => Ok(PackMethod::Gzip),
            3 => Ok(PackMethod::Lz4),
            _ => Err(Error::InvalidFile(format!("unknown pack method {value}"))),
        }
    }
}

/// Header-level package description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgInfo {
    pub entry_count: u32,
    pub digest_method: DigestMethod,
    pub sign_method: SignMethod,
    pub pkg_type: PkgType,
}

/// Upgrade-package metadata, written and read verbatim. Only persisted
/// for `PkgType::Upgrade`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePkgInfo {
    pub pkg: PkgInfo,
    pub software_version: String,
    pub date: String,
    pub time: String,
    pub product_update_id: String,
    pub update_file_version: u32,
}

/// Core component descriptor persisted in the component table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Unique name/path key within the package. Must be non-empty.
    pub identity: String,
    pub unpacked_size: u64,
    pub packed_size: u64,
    pub pack_method: PackMethod,
    pub digest_method: DigestMethod,
    /// Digest of the unpacked bytes, sized to `digest_method`.
    pub digest: Vec<u8>,
}

impl FileInfo {
    pub fn new(identity: impl Into<String>, pack: PackMethod, digest: DigestMethod) -> Self {
        Self {
            identity: identity.into(),
            unpacked_size: 0,
            packed_size: 0,
            pack_method: pack,
            digest_method: digest,
            digest: Vec::new(),
        }
    }
}

/// Deflate stream carries a zlib wrapper (set when it was compressed with
/// non-negative window bits).
pub const COMP_FLAG_ZLIB_WRAPPER: u32 = 1;

/// Full component descriptor: `FileInfo` plus the format metadata the
/// upgrade container records per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub file: FileInfo,
    pub version: String,
    pub id: u16,
    pub res_type: u8,
    pub comp_type: u8,
    pub flags: u32,
    pub original_size: u64,
}

impl ComponentInfo {
    pub fn new(file: FileInfo) -> Self {
        Self {
            file,
            version: String::new(),
            id: 0,
            res_type: 0,
            comp_type: 0,
            flags: 0,
            original_size: 0,
        }
    }
}

/// Deflate parameters, zlib-style. `method` must be 8 (deflate);
/// `mem_level` and `strategy` are carried for parameter parity but the
/// backend tunes by `level` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipParams {
    pub method: i32,
    pub level: u32,
    pub mem_level: i32,
    pub window_bits: i32,
    pub strategy: i32,
}

impl Default for ZipParams {
    fn default() -> Self {
        Self {
            method: 8,
            level: 6,
            mem_level: 8,
            window_bits: -15,
            strategy: 0,
        }
    }
}

/// LZ4 frame parameters. `block_size_id` indexes the standard LZ4F
/// block-size table (0 = default, 4..=7 = 64 KiB..4 MiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lz4Params {
    pub compression_level: i32,
    pub block_size_id: u8,
    pub content_checksum: bool,
    pub block_independence: bool,
}

impl Default for Lz4Params {
    fn default() -> Self {
        Self {
            compression_level: 1,
            block_size_id: 0,
            content_checksum: false,
            block_independence: false,
        }
    }
}

/// Codec parameters carried alongside a descriptor while packing. They
/// are never persisted verbatim; the table keeps only what decoding
/// needs (the pack method and the zlib-wrapper flag).
#[derive(Debug, Clone, PartialEq)]
pub enum PackParams {
    None,
    Zip(ZipParams),
    Gzip(ZipParams),
    Lz4(Lz4Params),
}

impl PackParams {
    pub fn method(&self) -> PackMethod {
        match self {
            PackParams::None => PackMethod::None,
            PackParams::Zip(_) => PackMethod::Zip,
            PackParams::Gzip(_) => PackMethod::Gzip,
            PackParams::Lz4(_) => PackMethod::Lz4,
        }
    }

    pub fn default_for(method: PackMethod) -> Self {
        match method {
            PackMethod::None => PackParams::None,
            PackMethod::Zip => PackParams::Zip(ZipParams::default()),
            PackMethod::Gzip => PackParams::Gzip(ZipParams::default()),
            PackMethod::Lz4 => PackParams::Lz4(Lz4Params::default()),
        }
    }
}
