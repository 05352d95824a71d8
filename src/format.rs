//! On-disk package layout.
//!
//! Private little-endian wire format, self-consistent across pack and
//! load: fixed 32-byte header, optional upgrade-metadata block,
//! component table in insertion order, payload region, trailing
//! signature block. Every parse is bounds-checked; truncation or
//! inconsistency is `InvalidFile`.

use crate::info::{
    ComponentInfo, DigestMethod, FileInfo, PackMethod, PkgInfo, PkgType, SignMethod,
    UpgradePkgInfo,
};
use crate::{Error, Result};

pub const PKG_MAGIC: u32 = 0x314B5055; // "UPK1" on disk
pub const PKG_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 32;

/// Fixed package header. The variable-length regions that follow are
/// sized by `meta_len`, `table_len` and `signature_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgHeader {
    pub pkg_type: PkgType,
    pub digest_method: DigestMethod,
    pub sign_method: SignMethod,
    pub entry_count: u32,
    pub meta_len: u32,
    pub table_len: u32,
    pub signature_len: u32,
}

impl PkgHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&PKG_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&PKG_VERSION.to_le_bytes());
        buf[8] = self.pkg_type.to_u8();
        buf[9] = self.digest_method.to_u8();
        buf[10] = self.sign_method.to_u8();
        buf[11] = 0;
        buf[12..16].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.meta_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.table_len.to_le_bytes());
        buf[24..28].copy_from_slice(&self.signature_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length"));
        if magic != PKG_MAGIC {
            return Err(Error::InvalidFile("bad package magic".to_string()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("slice length"));
        if version != PKG_VERSION {
            return Err(Error::InvalidFile(format!(
                "unsupported package format version {version}"
            )));
        }
        Ok(Self {
            pkg_type: PkgType::from_u8(bytes[8])?,
            digest_method: DigestMethod::from_u8(bytes[9])?,
            sign_method: SignMethod::from_u8(bytes[10])?,
            entry_count: u32::from_le_bytes(bytes[12..16].try_into().expect("slice length")),
            meta_len: u32::from_le_bytes(bytes[16..20].try_into().expect("slice length")),
            table_len: u32::from_le_bytes(bytes[20..24].try_into().expect("slice length")),
            signature_len: u32::from_le_bytes(bytes[24..28].try_into().expect("slice length")),
        })
    }
}

/// Bounds-checked cursor over a parsed region.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::InvalidFile("truncated package region".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("slice length")))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("slice length")))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("slice length")))
    }

    /// `u16`-length-prefixed byte run.
    pub(crate) fn bytes16(&mut self) -> Result<Vec<u8>> {
        let len = self.u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// `u16`-length-prefixed UTF-8 string.
    pub(crate) fn str16(&mut self) -> Result<String> {
        let raw = self.bytes16()?;
        String::from_utf8(raw)
            .map_err(|_| Error::InvalidFile("non-utf8 string in package".to_string()))
    }
}

pub(crate) fn put_bytes16(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::InvalidParam("field exceeds 64 KiB length prefix"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

pub(crate) fn put_str16(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    put_bytes16(buf, value.as_bytes())
}

pub(crate) fn encode_upgrade_meta(info: &UpgradePkgInfo) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    put_str16(&mut buf, &info.software_version)?;
    put_str16(&mut buf, &info.date)?;
    put_str16(&mut buf, &info.time)?;
    put_str16(&mut buf, &info.product_update_id)?;
    buf.extend_from_slice(&info.update_file_version.to_le_bytes());
    Ok(buf)
}

pub(crate) fn decode_upgrade_meta(buf: &[u8], pkg: PkgInfo) -> Result<UpgradePkgInfo> {
    let mut reader = WireReader::new(buf);
    let meta = UpgradePkgInfo {
        pkg,
        software_version: reader.str16()?,
        date: reader.str16()?,
        time: reader.str16()?,
        product_update_id: reader.str16()?,
        update_file_version: reader.u32()?,
    };
    if !reader.is_done() {
        return Err(Error::InvalidFile(
            "trailing bytes after upgrade metadata".to_string(),
        ));
    }
    Ok(meta)
}

/// One component-table row: the descriptor plus where its payload lives
/// relative to the payload region.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableEntry {
    pub info: ComponentInfo,
    pub payload_offset: u64,
}

pub(crate) fn encode_entry(buf: &mut Vec<u8>, entry: &TableEntry) -> Result<()> {
    let info = &entry.info;
    put_str16(buf, &info.file.identity)?;
    put_str16(buf, &info.version)?;
    buf.extend_from_slice(&info.id.to_le_bytes());
    buf.push(info.res_type);
    buf.push(info.comp_type);
    buf.extend_from_slice(&info.flags.to_le_bytes());
    buf.extend_from_slice(&info.original_size.to_le_bytes());
    buf.extend_from_slice(&info.file.unpacked_size.to_le_bytes());
    buf.extend_from_slice(&info.file.packed_size.to_le_bytes());
    buf.extend_from_slice(&entry.payload_offset.to_le_bytes());
    buf.push(info.file.pack_method.to_u8());
    buf.push(info.file.digest_method.to_u8());
    put_bytes16(buf, &info.file.digest)?;
    Ok(())
}

pub(crate) fn decode_entry(reader: &mut WireReader<'_>) -> Result<TableEntry> {
    let identity = reader.str16()?;
    let version = reader.str16()?;
    let id = reader.u16()?;
    let res_type = reader.u8()?;
    let comp_type = reader.u8()?;
    let flags = reader.u32()?;
    let original_size = reader.u64()?;
    let unpacked_size = reader.u64()?;
    let packed_size = reader.u64()?;
    let payload_offset = reader.u64()?;
    let pack_method = PackMethod::from_u8(reader.u8()?)?;
    let digest_method = DigestMethod::from_u8(reader.u8()?)?;
    let digest = reader.bytes16()?;

    if identity.is_empty() {
        return Err(Error::InvalidFile("empty component identity".to_string()));
    }
    if digest.len() != digest_method.digest_len() {
        return Err(Error::InvalidFile(format!(
            "digest length {} does not match method for {identity}",
            digest.len()
        )));
    }
    if pack_method == PackMethod::None && packed_size != unpacked_size {
        return Err(Error::InvalidFile(format!(
            "stored component {identity} has packed != unpacked size"
        )));
    }

    Ok(TableEntry {
        info: ComponentInfo {
            file: FileInfo {
                identity,
                unpacked_size,
                packed_size,
                pack_method,
                digest_method,
                digest,
            },
            version,
            id,
            res_type,
            comp_type,
            flags,
            original_size,
        },
        payload_offset,
    })
}

pub(crate) fn encode_table(entries: &[TableEntry]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for entry in entries {
        encode_entry(&mut buf, entry)?;
    }
    Ok(buf)
}

pub(crate) fn decode_table(buf: &[u8], entry_count: u32) -> Result<Vec<TableEntry>> {
    let mut reader = WireReader::new(buf);
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(decode_entry(&mut reader)?);
    }
    if !reader.is_done() {
        return Err(Error::InvalidFile(
            "component table longer than entry count".to_string(),
        ));
    }
    Ok(entries)
}
